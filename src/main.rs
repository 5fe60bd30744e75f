use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;

use warden_daemon::cases::{
    ActionHandler, ActionKind, ActionRegistry, CaseCheckRequest, CaseResult, CaseService,
    CaseStore, MemoryCaseStore, ModerationCase, NoopAction,
};
use warden_daemon::commands::builtin_commands;
use warden_daemon::config::BotConfig;
use warden_daemon::dispatch::{Dispatcher, EventLoop};
use warden_daemon::event::{InboundEvent, ResponseSender, TracingReporter};
use warden_daemon::permissions::{PermissionResolver, RoleSource};
use warden_daemon::{CASE_TARGET, CONSOLE_TARGET, Error, logging};

/// Console stand-in for the member directory: nobody holds roles, so
/// authorization runs on base level and configured overrides.
struct ConsoleDirectory;

#[async_trait]
impl RoleSource for ConsoleDirectory {
    async fn member_roles(&self, _guild_id: u64, _actor_id: u64) -> Result<Vec<u64>, Error> {
        Ok(Vec::new())
    }
}

/// Console stand-in for the platform moderation API: actions are
/// acknowledged in the log instead of applied to a real guild.
struct ConsoleModeration;

#[async_trait]
impl ActionHandler for ConsoleModeration {
    async fn apply(&self, case: &ModerationCase) -> CaseResult<()> {
        info!(
            target: CASE_TARGET,
            guild_id = %case.guild_id,
            case_id = %case.case_id,
            target_id = %case.target_id,
            kind = %case.kind,
            "Applying action"
        );
        Ok(())
    }

    async fn reverse(&self, case: &ModerationCase) -> CaseResult<()> {
        info!(
            target: CASE_TARGET,
            guild_id = %case.guild_id,
            case_id = %case.case_id,
            target_id = %case.target_id,
            kind = %case.kind,
            "Reversing action"
        );
        Ok(())
    }
}

/// Writes responses to stdout.
struct ConsoleSender;

#[async_trait]
impl ResponseSender for ConsoleSender {
    async fn send_response(&self, channel_id: u64, content: &str) -> Result<(), Error> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("[#{channel_id}] {content}\n").as_bytes())
            .await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Main function to run the daemon
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load configuration
    let config_path =
        env::var("WARDEN_CONFIG").unwrap_or_else(|_| BotConfig::DEFAULT_PATH.to_string());
    let config = BotConfig::load(&config_path).await;

    // Case engine: in-memory store, console action handlers, sweep task
    let store: Arc<dyn CaseStore> = Arc::new(MemoryCaseStore::new());
    let mut actions = ActionRegistry::new();
    actions.register(ActionKind::Warn, Box::new(NoopAction));
    actions.register(ActionKind::Unban, Box::new(NoopAction));
    for kind in [ActionKind::Mute, ActionKind::Ban, ActionKind::Kick] {
        actions.register(kind, Box::new(ConsoleModeration));
    }
    let cases = Arc::new(CaseService::new(store, Arc::new(actions)));
    let sweeper_tx = cases.start_sweeper(config.expiry_check_interval());

    // Permission resolver seeded from the configured guild tables
    let resolver = Arc::new(PermissionResolver::new(
        config.base_permission_level,
        Arc::new(ConsoleDirectory),
        config.permission_ttl(),
    ));
    for guild in &config.guilds {
        resolver.configure_guild(guild.guild_id, guild.clone().into());
    }

    // Dispatcher over the builtin command set
    let registry = builtin_commands(&cases, config.suggestion_distance)?;
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        resolver,
        Arc::new(ConsoleSender),
        Arc::new(TracingReporter),
        config.command_prefix.clone(),
        config.handler_timeout(),
    ));

    let (events_tx, events_rx) = mpsc::channel::<InboundEvent>(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(EventLoop::new(Arc::clone(&dispatcher)).run(events_rx, shutdown_rx));

    // Console transport: one stdin line becomes one inbound event
    let console = config.console.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = InboundEvent::new(
                console.actor_id,
                console.guild_id,
                console.channel_id,
                line,
            );
            if events_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    info!(
        target: CONSOLE_TARGET,
        config = %config_path,
        "Warden ready; type commands on stdin, ctrl-c to exit"
    );

    tokio::signal::ctrl_c().await?;
    info!(target: CONSOLE_TARGET, "Shutting down");

    let _ = shutdown_tx.send(true);
    let _ = sweeper_tx.send(CaseCheckRequest::Shutdown).await;
    reader.abort();
    runner.await?;

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime")
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}
