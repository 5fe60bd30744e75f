//! Argument tokenizing and type coercion
//!
//! Tokens are coerced per the command's declared schema. Failures name
//! the offending parameter; absent optional parameters receive their
//! declared defaults.

use crate::registry::command::{Param, ParamKind};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Actor(u64),
    Duration(Duration),
}

/// Validated arguments for one invocation, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    values: HashMap<String, ArgValue>,
}

impl ParsedArgs {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn actor(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(ArgValue::Actor(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn duration(&self, name: &str) -> Option<Duration> {
        match self.values.get(name) {
            Some(ArgValue::Duration(value)) => Some(*value),
            _ => None,
        }
    }
}

/// Argument validation failures. User-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("missing required argument `{parameter}`")]
    Missing { parameter: String },

    #[error("expected {expected}, got `{value}`")]
    Invalid {
        parameter: String,
        value: String,
        expected: &'static str,
    },

    #[error("unexpected trailing input `{trailing}`")]
    UnexpectedTrailing { trailing: String },
}

impl ArgumentError {
    /// The parameter the error names, when there is one.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Missing { parameter } | Self::Invalid { parameter, .. } => Some(parameter),
            Self::UnexpectedTrailing { .. } => None,
        }
    }
}

/// Validate arity and coerce `input` against the schema.
///
/// # Errors
/// Fails naming the offending parameter on a missing required argument
/// or a token the declared kind cannot coerce, and rejects trailing
/// input past the schema.
pub fn parse_args(params: &[Param], input: &str) -> Result<ParsedArgs, ArgumentError> {
    let mut parsed = ParsedArgs::default();
    let mut rest = input.trim();

    for param in params {
        let token = match param.kind {
            ParamKind::Rest => {
                let tail = rest.trim();
                rest = "";
                if tail.is_empty() { None } else { Some(tail) }
            }
            _ => {
                let (token, tail) = split_first_token(rest);
                rest = tail;
                token
            }
        };

        match token {
            Some(token) => {
                let value = coerce(param, token)?;
                parsed.values.insert(param.name.clone(), value);
            }
            None if param.required => {
                return Err(ArgumentError::Missing {
                    parameter: param.name.clone(),
                });
            }
            None => {
                if let Some(default) = &param.default {
                    parsed.values.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    let trailing = rest.trim();
    if !trailing.is_empty() {
        return Err(ArgumentError::UnexpectedTrailing {
            trailing: trailing.to_owned(),
        });
    }

    Ok(parsed)
}

fn split_first_token(input: &str) -> (Option<&str>, &str) {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return (None, "");
    }
    match trimmed.find(char::is_whitespace) {
        Some(boundary) => (Some(&trimmed[..boundary]), &trimmed[boundary..]),
        None => (Some(trimmed), ""),
    }
}

fn coerce(param: &Param, token: &str) -> Result<ArgValue, ArgumentError> {
    let invalid = |expected: &'static str| ArgumentError::Invalid {
        parameter: param.name.clone(),
        value: token.to_owned(),
        expected,
    };

    match param.kind {
        ParamKind::Text | ParamKind::Rest => Ok(ArgValue::Text(token.to_owned())),
        ParamKind::Integer => token
            .parse::<i64>()
            .map(ArgValue::Integer)
            .map_err(|_| invalid("an integer")),
        ParamKind::Actor => parse_actor(token)
            .map(ArgValue::Actor)
            .ok_or_else(|| invalid("an actor mention or id")),
        ParamKind::Duration => parse_duration(token)
            .map(ArgValue::Duration)
            .ok_or_else(|| invalid("a duration such as `10m` or `2h`")),
    }
}

/// Accepts `<@123>`, `<@!123>`, or a bare numeric id.
fn parse_actor(token: &str) -> Option<u64> {
    let inner = token
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.strip_prefix('!').unwrap_or(rest))
        .unwrap_or(token);
    inner.parse::<u64>().ok()
}

/// Parse a compact duration: unit-suffixed segments (`30s`, `10m`, `2h`,
/// `7d`) which may be chained (`1h30m`). Zero and unit-less input are
/// rejected.
#[must_use]
pub fn parse_duration(token: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut digits = String::new();

    for ch in token.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit_seconds: u64 = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(unit_seconds)?)?;
    }

    // A trailing bare number has no unit.
    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(Duration::from_secs(total))
}
