//! Command specifications and the handler seam

use crate::event::InvocationContext;
use crate::registry::arguments::{ArgValue, ParsedArgs};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

/// What a handler hands back on success: text for the actor, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: Option<String>,
}

impl Reply {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self { content: None }
    }
}

/// Errors escaping a handler body. The dispatcher classifies these;
/// the actor only ever sees a generic failure message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The backing store rejected or never saw the write.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Anything else a handler tripped over.
    #[error("handler failure: {0}")]
    Other(crate::Error),
}

impl From<crate::Error> for HandlerError {
    fn from(err: crate::Error) -> Self {
        Self::Other(err)
    }
}

impl From<crate::cases::CaseError> for HandlerError {
    fn from(err: crate::cases::CaseError) -> Self {
        match err {
            crate::cases::CaseError::Persistence(message) => Self::Persistence(message),
            other => Self::Other(other.into()),
        }
    }
}

/// The typed handler seam. One implementation per command, registered
/// and validated at startup.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError>;
}

/// Declared type of one command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A single free-form token.
    Text,
    /// Signed integer.
    Integer,
    /// An actor reference: `<@123>`, `<@!123>`, or a bare id.
    Actor,
    /// A compact duration such as `30s`, `10m`, `2h`, `1h30m`.
    Duration,
    /// Everything remaining on the line. Must be the last parameter.
    Rest,
}

/// One entry in a command's ordered argument schema.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<ArgValue>,
}

impl Param {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    #[must_use]
    pub fn optional_with(name: impl Into<String>, kind: ParamKind, default: ArgValue) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// A registered command. Immutable once handed to the registry.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub usage: String,
    pub params: Vec<Param>,
    pub required_level: u8,
    pub cooldown: Duration,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        usage: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: description.into(),
            usage: usage.into(),
            params: Vec::new(),
            required_level: 0,
            cooldown: Duration::ZERO,
            handler,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn required_level(mut self, level: u8) -> Self {
        self.required_level = level;
        self
    }

    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("params", &self.params)
            .field("required_level", &self.required_level)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
