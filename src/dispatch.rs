//! Invocation dispatch
//!
//! One invocation moves through `Received → Resolved → Authorized →
//! CooldownChecked → Executing` and terminates as `Completed`,
//! `Rejected`, or `Failed`. Side effects are strictly ordered: argument
//! validation happens before the cooldown is recorded, and the cooldown
//! is recorded before the handler starts, so a slow handler can never be
//! double-fired and a malformed invocation never burns a cooldown.

use crate::cooldown::CooldownTracker;
use crate::event::{
    ErrorReporter, FailureKind, InboundEvent, InvocationContext, Outcome, RejectReason,
    ResponseSender,
};
use crate::permissions::{Decision, PermissionResolver};
use crate::registry::{CommandRegistry, HandlerError, ResolveError, parse_args};
use crate::{CONSOLE_TARGET, DISPATCH_TARGET};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Resolves, authorizes, rate-limits, and executes invocations.
pub struct Dispatcher {
    registry: CommandRegistry,
    permissions: Arc<PermissionResolver>,
    cooldowns: CooldownTracker,
    responder: Arc<dyn ResponseSender>,
    reporter: Arc<dyn ErrorReporter>,
    prefix: String,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: CommandRegistry,
        permissions: Arc<PermissionResolver>,
        responder: Arc<dyn ResponseSender>,
        reporter: Arc<dyn ErrorReporter>,
        prefix: impl Into<String>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            permissions,
            cooldowns: CooldownTracker::new(),
            responder,
            reporter,
            prefix: prefix.into(),
            handler_timeout,
        }
    }

    /// Whether an event is addressed to the daemon at all. Non-matching
    /// chatter is dropped by the event loop before dispatch.
    #[must_use]
    pub fn is_invocation(&self, event: &InboundEvent) -> bool {
        let text = event.raw_text.trim_start();
        !text.is_empty() && text.starts_with(&self.prefix)
    }

    /// The dispatcher's single entry point: run one invocation to a
    /// terminal state.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let started = tokio::time::Instant::now();
        let text = event
            .raw_text
            .trim_start()
            .strip_prefix(&self.prefix)
            .unwrap_or(event.raw_text.trim_start());

        // Received → Resolved
        let (spec, arg_text) = match self.registry.resolve(text) {
            Ok(resolved) => resolved,
            Err(ResolveError::Empty) => {
                let context = InvocationContext::new(&event, "");
                return self
                    .reject(
                        &context,
                        RejectReason::UnknownCommand {
                            input: String::new(),
                            suggestion: None,
                        },
                    )
                    .await;
            }
            Err(ResolveError::Unknown { input, suggestion }) => {
                let context = InvocationContext::new(&event, input.clone());
                return self
                    .reject(&context, RejectReason::UnknownCommand { input, suggestion })
                    .await;
            }
        };
        let context = InvocationContext::new(&event, spec.name.clone());
        crate::logging::invocation_start(&context);

        // Argument validation still belongs to the Resolved stage: it
        // must precede the cooldown check-and-set.
        let args = match parse_args(&spec.params, arg_text) {
            Ok(args) => args,
            Err(err) => {
                let reason = RejectReason::InvalidArgument {
                    parameter: err.parameter().unwrap_or("input").to_owned(),
                    message: err.to_string(),
                };
                return self.finish(&context, started, self.reject(&context, reason).await);
            }
        };

        // Resolved → Authorized
        match self
            .permissions
            .authorize(event.actor_id, event.guild_id, spec.required_level)
            .await
        {
            Ok(Decision::Authorized { .. }) => {}
            Ok(Decision::Denied { effective, required }) => {
                let reason = RejectReason::InsufficientPermission {
                    required,
                    actual: effective,
                };
                return self.finish(&context, started, self.reject(&context, reason).await);
            }
            Err(err) => {
                let outcome = self
                    .fail(&context, FailureKind::Persistence, err.into())
                    .await;
                return self.finish(&context, started, outcome);
            }
        }

        // Authorized → CooldownChecked. Recording happens here, before
        // execution, as the re-entrancy guard.
        if let Err(remaining) = self
            .cooldowns
            .try_acquire(event.actor_id, &spec.name, spec.cooldown)
        {
            let reason = RejectReason::CooldownActive { remaining };
            return self.finish(&context, started, self.reject(&context, reason).await);
        }

        // CooldownChecked → Executing → Completed | Failed
        let outcome = match tokio::time::timeout(
            self.handler_timeout,
            spec.handler.run(&context, &args),
        )
        .await
        {
            Ok(Ok(reply)) => {
                if let Some(content) = reply.content {
                    self.send(&context, &content).await;
                }
                Outcome::Completed
            }
            Ok(Err(HandlerError::Persistence(message))) => {
                self.fail(&context, FailureKind::Persistence, message.into())
                    .await
            }
            Ok(Err(HandlerError::Other(err))) => {
                self.fail(&context, FailureKind::Handler, err).await
            }
            Err(_elapsed) => {
                let err = format!(
                    "handler exceeded its {}ms budget",
                    self.handler_timeout.as_millis()
                );
                self.fail(&context, FailureKind::Timeout, err.into()).await
            }
        };

        self.finish(&context, started, outcome)
    }

    fn finish(
        &self,
        context: &InvocationContext,
        started: tokio::time::Instant,
        outcome: Outcome,
    ) -> Outcome {
        crate::logging::invocation_end(context, started.elapsed(), &outcome);
        outcome
    }

    async fn reject(&self, context: &InvocationContext, reason: RejectReason) -> Outcome {
        debug!(
            target: DISPATCH_TARGET,
            invocation_id = %context.invocation_id,
            actor_id = %context.actor_id,
            command = %context.command,
            reason = ?reason,
            "Invocation rejected"
        );
        self.send(context, &reason.user_message()).await;
        Outcome::Rejected(reason)
    }

    async fn fail(
        &self,
        context: &InvocationContext,
        kind: FailureKind,
        error: crate::Error,
    ) -> Outcome {
        self.reporter.report(context, kind, &error);
        self.send(context, "Something went wrong running that command.")
            .await;
        Outcome::Failed(kind)
    }

    async fn send(&self, context: &InvocationContext, content: &str) {
        if let Err(err) = self
            .responder
            .send_response(context.channel_id, content)
            .await
        {
            warn!(
                target: DISPATCH_TARGET,
                invocation_id = %context.invocation_id,
                channel_id = %context.channel_id,
                error = %err,
                "Failed to deliver response"
            );
        }
    }
}

/// Front of the event loop: one spawned task per inbound event, clean
/// exit on shutdown.
pub struct EventLoop {
    dispatcher: Arc<Dispatcher>,
}

impl EventLoop {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Consume the inbound stream until it closes or shutdown flips.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<InboundEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        if !self.dispatcher.is_invocation(&event) {
                            continue;
                        }
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(async move {
                            dispatcher.handle(event).await;
                        });
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(target: CONSOLE_TARGET, "Event loop stopped");
    }
}
