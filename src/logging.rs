//! Logging setup and dispatch log events
//!
//! Console output is human-readable; the dispatch log is JSON with
//! daily rotation for downstream ingestion.

use crate::DISPATCH_TARGET;
use crate::event::{InvocationContext, Outcome};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Dispatch log file name
pub const DISPATCH_LOG_FILE: &str = "dispatch";

/// Initialize the logging system with console and file outputs
///
/// # Errors
/// Fails when the log directory cannot be created or a subscriber is
/// already installed.
pub fn init() -> Result<(), crate::Error> {
    // Create log directory if it doesn't exist
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    // Daily-rotated JSON dispatch log
    let dispatch_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, DISPATCH_LOG_FILE);

    // Human-readable console layer
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    let dispatch_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(dispatch_file);

    // Runtime-configurable filtering, defaulting to info
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(dispatch_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

/// Log the start of an invocation, once it has resolved to a command.
pub fn invocation_start(context: &InvocationContext) {
    info!(
        target: DISPATCH_TARGET,
        invocation_id = %context.invocation_id,
        command = %context.command,
        guild_id = %context.guild_id,
        actor_id = %context.actor_id,
        event = "start",
        "Invocation started"
    );
}

/// Log the terminal state of an invocation.
pub fn invocation_end(context: &InvocationContext, duration: Duration, outcome: &Outcome) {
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or_default();
    info!(
        target: DISPATCH_TARGET,
        invocation_id = %context.invocation_id,
        command = %context.command,
        guild_id = %context.guild_id,
        actor_id = %context.actor_id,
        duration_ms = duration_ms,
        outcome = outcome.label(),
        event = "end",
        "Invocation finished"
    );
}
