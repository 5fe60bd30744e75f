//! Command registration and matching
//!
//! Commands are declared once at startup as [`CommandSpec`]s (name,
//! aliases, typed argument schema, required permission level, cooldown,
//! and the handler object) and resolved per invocation by the
//! [`CommandRegistry`], including typo suggestions for near misses.

mod arguments;
mod command;
mod matcher;

pub use arguments::{ArgValue, ArgumentError, ParsedArgs, parse_args, parse_duration};
pub use command::{CommandHandler, CommandSpec, HandlerError, Param, ParamKind, Reply};
pub use matcher::{CommandRegistry, RegistryError, ResolveError};
