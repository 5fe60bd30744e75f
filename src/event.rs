//! Inbound events, invocation outcomes, and the transport seams
//!
//! The gateway client is an external collaborator: it hands the daemon
//! normalized [`InboundEvent`]s and accepts responses through
//! [`ResponseSender`]. Nothing in this crate talks to a chat platform
//! directly.

use crate::ERROR_TARGET;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

/// A normalized inbound chat event as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub actor_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Create an event stamped with the current time.
    pub fn new(actor_id: u64, guild_id: u64, channel_id: u64, raw_text: impl Into<String>) -> Self {
        Self {
            actor_id,
            guild_id,
            channel_id,
            raw_text: raw_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Identity of one invocation, carried through logs and error reports.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: Uuid,
    pub actor_id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub command: String,
}

impl InvocationContext {
    pub fn new(event: &InboundEvent, command: impl Into<String>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            actor_id: event.actor_id,
            guild_id: event.guild_id,
            channel_id: event.channel_id,
            command: command.into(),
        }
    }
}

/// Terminal state of one handled invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Rejected(RejectReason),
    Failed(FailureKind),
}

impl Outcome {
    /// Short label for structured log fields.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Expected negative outcomes, surfaced to the actor and never escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownCommand {
        input: String,
        suggestion: Option<String>,
    },
    InvalidArgument {
        parameter: String,
        message: String,
    },
    InsufficientPermission {
        required: u8,
        actual: u8,
    },
    CooldownActive {
        remaining: Duration,
    },
}

impl RejectReason {
    /// The message shown to the actor. Internal detail never leaks here.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownCommand { input, .. } if input.is_empty() => {
                "No command given.".to_string()
            }
            Self::UnknownCommand {
                input,
                suggestion: Some(suggestion),
            } => format!("Unknown command `{input}`. Did you mean `{suggestion}`?"),
            Self::UnknownCommand {
                input,
                suggestion: None,
            } => format!("Unknown command `{input}`."),
            Self::InvalidArgument { parameter, message } => {
                format!("Invalid argument `{parameter}`: {message}")
            }
            Self::InsufficientPermission { .. } => "insufficient permission".to_string(),
            Self::CooldownActive { remaining } => {
                let seconds = remaining.as_secs().max(1);
                format!("Command is on cooldown. Try again in {seconds}s.")
            }
        }
    }
}

/// Classification of escalated failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FailureKind {
    /// Error caught inside a handler body.
    #[display("handler")]
    Handler,
    /// Handler exceeded its wall-clock budget.
    #[display("timeout")]
    Timeout,
    /// Backing store or collaborator read/write failed.
    #[display("persistence")]
    Persistence,
}

/// Outbound half of the transport seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send_response(&self, channel_id: u64, content: &str) -> Result<(), crate::Error>;
}

/// External error-tracking collaborator. Failures land here with the
/// invocation attached; rejections never do.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, invocation: &InvocationContext, kind: FailureKind, error: &crate::Error);
}

/// Default reporter backed by the tracing stack.
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, invocation: &InvocationContext, kind: FailureKind, error: &crate::Error) {
        error!(
            target: ERROR_TARGET,
            invocation_id = %invocation.invocation_id,
            actor_id = %invocation.actor_id,
            guild_id = %invocation.guild_id,
            command = %invocation.command,
            kind = %kind,
            error = %error,
            "Invocation failed"
        );
    }
}
