pub mod cache;
pub mod cases;
pub mod commands;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod event;
pub mod logging;
pub mod permissions;
pub mod registry;

// Customize these constants for your daemon
pub const BOT_NAME: &str = "warden_daemon";
pub const DISPATCH_TARGET: &str = "warden_daemon::dispatch";
pub const ERROR_TARGET: &str = "warden_daemon::error";
pub const CASE_TARGET: &str = "warden_daemon::cases";
pub const CONSOLE_TARGET: &str = "warden_daemon";

pub use event::{InboundEvent, Outcome};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
