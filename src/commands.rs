//! Builtin commands
//!
//! The moderation surface over the case engine, plus the ping utility.
//! Each command is a handler struct registered into the
//! [`CommandRegistry`] by [`builtin_commands`].

use crate::cases::{ActionKind, CaseError, CaseFilter, CaseService, ModerationCase};
use crate::event::InvocationContext;
use crate::registry::{
    ArgValue, CommandHandler, CommandRegistry, CommandSpec, HandlerError, Param, ParamKind,
    ParsedArgs, RegistryError, Reply,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REASON: &str = "No reason provided.";
const DEFAULT_MUTE: Duration = Duration::from_secs(600);

/// Build the registry with every builtin command wired to the engine.
///
/// # Errors
/// Propagates registration failures; with the builtin set these only
/// occur if the table itself is inconsistent.
pub fn builtin_commands(
    cases: &Arc<CaseService>,
    suggestion_distance: usize,
) -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new(suggestion_distance);

    registry.register(
        CommandSpec::new(
            "ping",
            "Check that the daemon is responsive.",
            "ping",
            Arc::new(PingCommand { started: Utc::now() }),
        )
        .alias("status"),
    )?;

    registry.register(
        CommandSpec::new(
            "warn",
            "Record a warning against an actor.",
            "warn <target> [reason]",
            Arc::new(WarnCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(1)
        .cooldown(Duration::from_secs(3)),
    )?;

    registry.register(
        CommandSpec::new(
            "mute",
            "Mute an actor for a duration.",
            "mute <target> [duration] [reason]",
            Arc::new(MuteCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .param(Param::optional_with(
            "duration",
            ParamKind::Duration,
            ArgValue::Duration(DEFAULT_MUTE),
        ))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(2)
        .cooldown(Duration::from_secs(3)),
    )?;

    registry.register(
        CommandSpec::new(
            "unmute",
            "Lift an actor's active mute.",
            "unmute <target>",
            Arc::new(LiftCommand {
                cases: Arc::clone(cases),
                kind: ActionKind::Mute,
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .required_level(2),
    )?;

    registry.register(
        CommandSpec::new(
            "ban",
            "Ban an actor, permanently or for a duration.",
            "ban <target> [duration] [reason]",
            Arc::new(BanCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .param(Param::optional("duration", ParamKind::Duration))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(3)
        .cooldown(Duration::from_secs(3)),
    )?;

    registry.register(
        CommandSpec::new(
            "unban",
            "Lift an actor's active ban and record the reversal.",
            "unban <target> [reason]",
            Arc::new(UnbanCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(3),
    )?;

    registry.register(
        CommandSpec::new(
            "kick",
            "Remove an actor from the guild.",
            "kick <target> [reason]",
            Arc::new(KickCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("target", ParamKind::Actor))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(2)
        .cooldown(Duration::from_secs(3)),
    )?;

    registry.register(
        CommandSpec::new(
            "cases",
            "List recent moderation cases, optionally for one actor.",
            "cases [target]",
            Arc::new(CasesCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::optional("target", ParamKind::Actor))
        .required_level(1),
    )?;

    registry.register(
        CommandSpec::new(
            "case",
            "Show or close one moderation case.",
            "case <id> [close] [reason]",
            Arc::new(CaseCommand {
                cases: Arc::clone(cases),
            }),
        )
        .param(Param::required("id", ParamKind::Integer))
        .param(Param::optional("action", ParamKind::Text))
        .param(Param::optional_with(
            "reason",
            ParamKind::Rest,
            ArgValue::Text(DEFAULT_REASON.to_string()),
        ))
        .required_level(1),
    )?;

    Ok(registry)
}

fn required_actor(args: &ParsedArgs, name: &str) -> Result<u64, HandlerError> {
    args.actor(name)
        .ok_or_else(|| HandlerError::Other(format!("argument `{name}` missing after validation").into()))
}

fn reason_of(args: &ParsedArgs) -> String {
    args.text("reason").unwrap_or(DEFAULT_REASON).to_owned()
}

/// Compact rendering for durations in replies: `1h30m`, `45s`.
fn format_duration(duration: Duration) -> String {
    let mut seconds = duration.as_secs();
    let mut parts = String::new();
    for (unit_seconds, suffix) in [(86_400, 'd'), (3600, 'h'), (60, 'm'), (1, 's')] {
        let count = seconds / unit_seconds;
        if count > 0 {
            parts.push_str(&format!("{count}{suffix}"));
            seconds %= unit_seconds;
        }
    }
    if parts.is_empty() {
        parts.push_str("0s");
    }
    parts
}

fn describe(case: &ModerationCase) -> String {
    let state = if case.active { "active" } else { "closed" };
    format!(
        "#{} {} <@{}> by <@{}>: {} ({state})",
        case.case_id, case.kind, case.target_id, case.moderator_id, case.reason
    )
}

struct PingCommand {
    started: DateTime<Utc>,
}

#[async_trait]
impl CommandHandler for PingCommand {
    async fn run(
        &self,
        _invocation: &InvocationContext,
        _args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let uptime = (Utc::now() - self.started)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(Reply::text(format!("Pong! Up {}.", format_duration(uptime))))
    }
}

struct WarnCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for WarnCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let case = self
            .cases
            .open_case(
                invocation.guild_id,
                target,
                invocation.actor_id,
                ActionKind::Warn,
                reason_of(args),
                None,
            )
            .await?;
        Ok(Reply::text(format!(
            "Warned <@{target}> (case #{}).",
            case.case_id
        )))
    }
}

struct MuteCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for MuteCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let duration = args.duration("duration").unwrap_or(DEFAULT_MUTE);
        let case = self
            .cases
            .open_case(
                invocation.guild_id,
                target,
                invocation.actor_id,
                ActionKind::Mute,
                reason_of(args),
                Some(duration),
            )
            .await?;
        Ok(Reply::text(format!(
            "Muted <@{target}> for {} (case #{}).",
            format_duration(duration),
            case.case_id
        )))
    }
}

struct BanCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for BanCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let duration = args.duration("duration");
        let case = self
            .cases
            .open_case(
                invocation.guild_id,
                target,
                invocation.actor_id,
                ActionKind::Ban,
                reason_of(args),
                duration,
            )
            .await?;
        let span = match duration {
            Some(duration) => format!("for {}", format_duration(duration)),
            None => "permanently".to_string(),
        };
        Ok(Reply::text(format!(
            "Banned <@{target}> {span} (case #{}).",
            case.case_id
        )))
    }
}

struct KickCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for KickCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let case = self
            .cases
            .open_case(
                invocation.guild_id,
                target,
                invocation.actor_id,
                ActionKind::Kick,
                reason_of(args),
                None,
            )
            .await?;
        Ok(Reply::text(format!(
            "Kicked <@{target}> (case #{}).",
            case.case_id
        )))
    }
}

/// Explicit reversal of the target's newest active case of `kind`,
/// through the same `expire` path the scheduler uses.
struct LiftCommand {
    cases: Arc<CaseService>,
    kind: ActionKind,
}

impl LiftCommand {
    async fn newest_active(
        &self,
        guild_id: u64,
        target: u64,
    ) -> Result<Option<ModerationCase>, CaseError> {
        let filter = CaseFilter::default()
            .target(target)
            .kind(self.kind)
            .active(true);
        Ok(self.cases.list_cases(guild_id, filter).await?.into_iter().next())
    }
}

#[async_trait]
impl CommandHandler for LiftCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let Some(case) = self.newest_active(invocation.guild_id, target).await? else {
            return Ok(Reply::text(format!(
                "No active {} case for <@{target}>.",
                self.kind
            )));
        };

        self.cases.expire(invocation.guild_id, case.case_id).await?;
        Ok(Reply::text(format!(
            "Lifted {} for <@{target}> (case #{}).",
            self.kind, case.case_id
        )))
    }
}

/// Unban lifts the active ban and records the reversal as its own case.
struct UnbanCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for UnbanCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let target = required_actor(args, "target")?;
        let filter = CaseFilter::default()
            .target(target)
            .kind(ActionKind::Ban)
            .active(true);
        let Some(ban) = self
            .cases
            .list_cases(invocation.guild_id, filter)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(Reply::text(format!("No active ban case for <@{target}>.")));
        };

        self.cases.expire(invocation.guild_id, ban.case_id).await?;
        let record = self
            .cases
            .open_case(
                invocation.guild_id,
                target,
                invocation.actor_id,
                ActionKind::Unban,
                reason_of(args),
                None,
            )
            .await?;
        Ok(Reply::text(format!(
            "Unbanned <@{target}> (ban case #{}, recorded as case #{}).",
            ban.case_id, record.case_id
        )))
    }
}

struct CasesCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for CasesCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let mut filter = CaseFilter::default();
        if let Some(target) = args.actor("target") {
            filter = filter.target(target);
        }

        let listed = self.cases.list_cases(invocation.guild_id, filter).await?;
        if listed.is_empty() {
            return Ok(Reply::text("No cases on record."));
        }

        let lines: Vec<String> = listed.iter().take(10).map(describe).collect();
        Ok(Reply::text(lines.join("\n")))
    }
}

struct CaseCommand {
    cases: Arc<CaseService>,
}

#[async_trait]
impl CommandHandler for CaseCommand {
    async fn run(
        &self,
        invocation: &InvocationContext,
        args: &ParsedArgs,
    ) -> Result<Reply, HandlerError> {
        let id = args.integer("id").unwrap_or_default();
        let Ok(case_id) = u64::try_from(id) else {
            return Ok(Reply::text("Case ids are positive numbers."));
        };

        match args.text("action").map(str::trim) {
            Some(action) if action.eq_ignore_ascii_case("close") => {
                match self
                    .cases
                    .close_case(invocation.guild_id, case_id, reason_of(args))
                    .await
                {
                    Ok(case) => Ok(Reply::text(format!("Closed case #{}.", case.case_id))),
                    Err(CaseError::InvalidTransition) => {
                        Ok(Reply::text(format!("Case #{case_id} is already closed.")))
                    }
                    Err(CaseError::NotFound { .. }) => {
                        Ok(Reply::text(format!("No case #{case_id} on record.")))
                    }
                    Err(other) => Err(other.into()),
                }
            }
            Some(other) => Ok(Reply::text(format!(
                "Unknown case action `{other}`; try `close`."
            ))),
            None => match self.cases.get_case(invocation.guild_id, case_id).await? {
                Some(case) => Ok(Reply::text(describe(&case))),
                None => Ok(Reply::text(format!("No case #{case_id} on record."))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{ActionHandler, ActionRegistry, CaseResult, MemoryCaseStore};
    use crate::registry::parse_args;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingAction {
        applied: AtomicUsize,
        reversed: AtomicUsize,
    }

    impl CountingAction {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                applied: AtomicUsize::new(0),
                reversed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ActionHandler for Arc<CountingAction> {
        async fn apply(&self, _case: &ModerationCase) -> CaseResult<()> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reverse(&self, _case: &ModerationCase) -> CaseResult<()> {
            self.reversed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn engine(recorder: &Arc<CountingAction>) -> Arc<CaseService> {
        let mut actions = ActionRegistry::new();
        for kind in [
            ActionKind::Warn,
            ActionKind::Mute,
            ActionKind::Ban,
            ActionKind::Kick,
            ActionKind::Unban,
        ] {
            actions.register(kind, Box::new(Arc::clone(recorder)));
        }
        Arc::new(CaseService::new(
            Arc::new(MemoryCaseStore::new()),
            Arc::new(actions),
        ))
    }

    fn invocation(command: &str) -> InvocationContext {
        InvocationContext {
            invocation_id: Uuid::new_v4(),
            actor_id: 99,
            guild_id: 1,
            channel_id: 5,
            command: command.to_string(),
        }
    }

    /// Resolve through the real registry so handler inputs match the
    /// declared schemas.
    async fn run(
        registry: &CommandRegistry,
        text: &str,
    ) -> Result<Reply, HandlerError> {
        let (spec, tail) = registry.resolve(text).expect("command resolves");
        let args = parse_args(&spec.params, tail).expect("arguments parse");
        spec.handler.run(&invocation(&spec.name), &args).await
    }

    #[tokio::test]
    async fn test_warn_records_a_case_with_default_reason() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        let reply = run(&registry, "warn <@10>").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("Warned <@10> (case #1)."));

        let stored = cases.get_case(1, 1).await.unwrap().unwrap();
        assert_eq!(stored.kind, ActionKind::Warn);
        assert_eq!(stored.reason, DEFAULT_REASON);
        assert!(stored.active);
        assert!(!stored.is_temporary());
    }

    #[tokio::test]
    async fn test_mute_defaults_to_ten_minutes() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        let reply = run(&registry, "mute <@10>").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Muted <@10> for 10m (case #1).")
        );

        let stored = cases.get_case(1, 1).await.unwrap().unwrap();
        assert!(stored.is_temporary());
        assert_eq!(stored.reason, DEFAULT_REASON);
        assert_eq!(recorder.applied.load(Ordering::SeqCst), 1);

        let reply = run(&registry, "mute <@11> 30m spamming links").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Muted <@11> for 30m (case #2).")
        );
        let stored = cases.get_case(1, 2).await.unwrap().unwrap();
        assert_eq!(stored.reason, "spamming links");
    }

    #[tokio::test]
    async fn test_unmute_takes_the_expire_path_once() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        run(&registry, "mute <@10> 1h being loud").await.unwrap();
        let reply = run(&registry, "unmute <@10>").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Lifted mute for <@10> (case #1).")
        );
        assert_eq!(recorder.reversed.load(Ordering::SeqCst), 1);

        // Nothing left to lift.
        let reply = run(&registry, "unmute <@10>").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("No active mute case for <@10>.")
        );
        assert_eq!(recorder.reversed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unban_lifts_and_records() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        run(&registry, "ban <@10>").await.unwrap();
        let reply = run(&registry, "unban <@10> appeal accepted").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Unbanned <@10> (ban case #1, recorded as case #2).")
        );
        assert_eq!(recorder.reversed.load(Ordering::SeqCst), 1);

        let record = cases.get_case(1, 2).await.unwrap().unwrap();
        assert_eq!(record.kind, ActionKind::Unban);
        assert_eq!(record.reason, "appeal accepted");
    }

    #[tokio::test]
    async fn test_unban_without_an_active_ban_opens_nothing() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        let reply = run(&registry, "unban <@10>").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("No active ban case for <@10>.")
        );
        assert!(cases.list_cases(1, CaseFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_ban_wording() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        let reply = run(&registry, "ban <@10>").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Banned <@10> permanently (case #1).")
        );

        let reply = run(&registry, "ban <@11> 2d ban evasion").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Banned <@11> for 2d (case #2).")
        );
    }

    #[tokio::test]
    async fn test_cases_lists_newest_first_and_filters_by_target() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        run(&registry, "warn <@10> first").await.unwrap();
        run(&registry, "warn <@11> second").await.unwrap();
        run(&registry, "kick <@10> third").await.unwrap();

        let reply = run(&registry, "cases").await.unwrap();
        let content = reply.content.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#3 kick <@10>"));

        let reply = run(&registry, "cases <@10>").await.unwrap();
        assert_eq!(reply.content.unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_case_show_and_close() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        run(&registry, "warn <@10> spam").await.unwrap();

        let reply = run(&registry, "case 1").await.unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("#1 warn <@10> by <@99>: spam (active)")
        );

        let reply = run(&registry, "case 1 close appeal accepted").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("Closed case #1."));

        let reply = run(&registry, "case 1 close again").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("Case #1 is already closed."));

        let reply = run(&registry, "case 9").await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("No case #9 on record."));
    }

    #[tokio::test]
    async fn test_ping_replies_with_uptime() {
        let recorder = CountingAction::new();
        let cases = engine(&recorder);
        let registry = builtin_commands(&cases, 2).unwrap();

        let reply = run(&registry, "ping").await.unwrap();
        assert!(reply.content.unwrap().starts_with("Pong!"));

        // The original's alias survives.
        let reply = run(&registry, "status").await.unwrap();
        assert!(reply.content.unwrap().starts_with("Pong!"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1d1h1m1s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
