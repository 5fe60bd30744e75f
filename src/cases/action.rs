//! Platform-side action handlers
//!
//! Applying a mute or reversing a ban is the transport collaborator's
//! job; the engine drives it through the [`ActionHandler`] seam. One
//! handler per [`ActionKind`], registered at wiring time.

use crate::cases::error::{CaseError, CaseResult};
use crate::cases::record::{ActionKind, ModerationCase};
use async_trait::async_trait;
use std::collections::HashMap;

/// Applies and reverses one kind of moderation action on the platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Put the action into force for the case's target.
    async fn apply(&self, case: &ModerationCase) -> CaseResult<()>;

    /// Lift the action (unmute, unban) for the case's target.
    async fn reverse(&self, case: &ModerationCase) -> CaseResult<()>;
}

/// Handler for actions with no platform side effect (warnings).
pub struct NoopAction;

#[async_trait]
impl ActionHandler for NoopAction {
    async fn apply(&self, _case: &ModerationCase) -> CaseResult<()> {
        Ok(())
    }

    async fn reverse(&self, _case: &ModerationCase) -> CaseResult<()> {
        Ok(())
    }
}

/// Registry of action handlers, keyed by action kind.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an action kind, replacing any previous one.
    pub fn register(&mut self, kind: ActionKind, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Apply the case's action.
    ///
    /// # Errors
    /// Fails when no handler is registered for the kind, or the handler
    /// itself fails.
    pub async fn apply(&self, case: &ModerationCase) -> CaseResult<()> {
        self.get(case.kind)?.apply(case).await
    }

    /// Reverse the case's action.
    ///
    /// # Errors
    /// Fails when no handler is registered for the kind, or the handler
    /// itself fails.
    pub async fn reverse(&self, case: &ModerationCase) -> CaseResult<()> {
        self.get(case.kind)?.reverse(case).await
    }

    fn get(&self, kind: ActionKind) -> CaseResult<&dyn ActionHandler> {
        self.handlers
            .get(&kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| CaseError::Action(format!("no handler registered for {kind}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mute_case() -> ModerationCase {
        ModerationCase::new(1, 1, 10, 20, ActionKind::Mute, "spam", None)
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_an_error() {
        let registry = ActionRegistry::new();
        let err = registry.apply(&mute_case()).await.unwrap_err();
        assert!(matches!(err, CaseError::Action(message) if message.contains("mute")));
    }

    #[tokio::test]
    async fn test_dispatches_to_the_registered_handler() {
        let mut handler = MockActionHandler::new();
        handler.expect_apply().times(1).returning(|_| Ok(()));
        handler.expect_reverse().times(1).returning(|_| Ok(()));

        let mut registry = ActionRegistry::new();
        registry.register(ActionKind::Mute, Box::new(handler));

        registry.apply(&mute_case()).await.unwrap();
        registry.reverse(&mute_case()).await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_handler_always_succeeds() {
        let mut registry = ActionRegistry::new();
        registry.register(ActionKind::Warn, Box::new(NoopAction));

        let case = ModerationCase::new(1, 1, 10, 20, ActionKind::Warn, "spam", None);
        registry.apply(&case).await.unwrap();
        registry.reverse(&case).await.unwrap();
    }
}
