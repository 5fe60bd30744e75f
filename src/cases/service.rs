//! Case service
//!
//! Owns the lifecycle of moderation cases: opening with per-guild
//! sequential ids, administrative closing, and scheduled expiry with
//! exactly-once reversal. A background sweep task finds lapsed cases on
//! an interval and on demand.

use crate::CASE_TARGET;
use crate::cases::action::ActionRegistry;
use crate::cases::error::{CaseError, CaseResult};
use crate::cases::record::{ActionKind, ModerationCase};
use crate::cases::store::{CaseFilter, CaseStore};
use chrono::Utc;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error, info};

/// Request type for the sweep task
#[derive(Debug, Clone)]
pub enum CaseCheckRequest {
    /// Check every case regardless of timing
    CheckAll,
    /// Check one case
    CheckCase { guild_id: u64, case_id: u64 },
    /// Shut the sweep task down
    Shutdown,
}

/// Service for moderation case operations
pub struct CaseService {
    store: Arc<dyn CaseStore>,
    actions: Arc<ActionRegistry>,
    notifier: OnceLock<Sender<CaseCheckRequest>>,
}

impl CaseService {
    pub fn new(store: Arc<dyn CaseStore>, actions: Arc<ActionRegistry>) -> Self {
        Self {
            store,
            actions,
            notifier: OnceLock::new(),
        }
    }

    /// Open a case: allocate the guild's next id, persist the full
    /// record in one write, then apply the platform-side action.
    ///
    /// A finite `duration` makes the case eligible for scheduled expiry.
    /// An apply failure is logged and reported through the record's
    /// trail but the persisted case stands.
    ///
    /// # Errors
    /// `Persistence` when the store rejects the allocation or the write;
    /// in that event no partial case exists.
    pub async fn open_case(
        &self,
        guild_id: u64,
        target_id: u64,
        moderator_id: u64,
        kind: ActionKind,
        reason: impl Into<String> + Send,
        duration: Option<Duration>,
    ) -> CaseResult<ModerationCase> {
        let case_id = self.store.next_case_id(guild_id).await?;
        let case = ModerationCase::new(
            guild_id,
            case_id,
            target_id,
            moderator_id,
            kind,
            reason,
            duration,
        );
        self.store.insert(case.clone()).await?;

        info!(
            target: CASE_TARGET,
            guild_id = %guild_id,
            case_id = %case_id,
            target_id = %target_id,
            moderator_id = %moderator_id,
            kind = %kind,
            expires_at = ?case.expires_at,
            "Case opened"
        );

        if let Err(err) = self.actions.apply(&case).await {
            error!(
                target: CASE_TARGET,
                guild_id = %guild_id,
                case_id = %case_id,
                error = %err,
                "Failed to apply action for case"
            );
        }

        if case.is_temporary() {
            self.notify(CaseCheckRequest::CheckCase { guild_id, case_id })
                .await;
        }

        Ok(case)
    }

    /// Administratively close a case: out of force, pending expiry
    /// cancelled, no reversal performed.
    ///
    /// # Errors
    /// `NotFound` for an unknown case, `InvalidTransition` when it is
    /// already inactive.
    pub async fn close_case(
        &self,
        guild_id: u64,
        case_id: u64,
        reason: impl Into<String> + Send,
    ) -> CaseResult<ModerationCase> {
        match self
            .store
            .deactivate(guild_id, case_id, Some(reason.into()))
            .await?
        {
            Some(case) => Ok(case),
            None => Err(CaseError::InvalidTransition),
        }
    }

    /// Expire a case: reversal exactly once, then out of force.
    ///
    /// Idempotent: an inactive case is a no-op returning `false`. The
    /// state flip is atomic in the store, so of any number of concurrent
    /// callers exactly one performs the reversal.
    ///
    /// # Errors
    /// `NotFound` for an unknown case, `Persistence` when the store is
    /// unreachable.
    pub async fn expire(&self, guild_id: u64, case_id: u64) -> CaseResult<bool> {
        let Some(case) = self.store.deactivate(guild_id, case_id, None).await? else {
            return Ok(false);
        };

        info!(
            target: CASE_TARGET,
            guild_id = %guild_id,
            case_id = %case_id,
            target_id = %case.target_id,
            kind = %case.kind,
            "Case expired"
        );

        if case.kind.reversible() {
            if let Err(err) = self.actions.reverse(&case).await {
                error!(
                    target: CASE_TARGET,
                    guild_id = %guild_id,
                    case_id = %case_id,
                    error = %err,
                    "Failed to reverse action for expired case"
                );
            }
        }

        Ok(true)
    }

    /// One case by id.
    ///
    /// # Errors
    /// `Persistence` when the store is unreachable.
    pub async fn get_case(&self, guild_id: u64, case_id: u64) -> CaseResult<Option<ModerationCase>> {
        self.store.get(guild_id, case_id).await
    }

    /// Cases matching the filter, newest first.
    ///
    /// # Errors
    /// `Persistence` when the store is unreachable.
    pub async fn list_cases(
        &self,
        guild_id: u64,
        filter: CaseFilter,
    ) -> CaseResult<Vec<ModerationCase>> {
        self.store.list(guild_id, filter).await
    }

    /// Start the background sweep task. Returns the request sender; the
    /// service keeps a copy for its own notifications.
    pub fn start_sweeper(
        self: &Arc<Self>,
        check_interval: Duration,
    ) -> Sender<CaseCheckRequest> {
        let (tx, rx) = mpsc::channel::<CaseCheckRequest>(64);
        let _ = self.notifier.set(tx.clone());

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.sweep_task(rx, check_interval).await;
        });

        tx
    }

    /// The sweep task: expires due cases on an interval and on demand.
    async fn sweep_task(&self, mut rx: Receiver<CaseCheckRequest>, check_interval: Duration) {
        info!(
            target: CASE_TARGET,
            interval_secs = check_interval.as_secs(),
            "Starting case sweep task"
        );

        let mut ticker = tokio::time::interval(check_interval);
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(CaseCheckRequest::CheckAll) => self.sweep().await,
                    Some(CaseCheckRequest::CheckCase { guild_id, case_id }) => {
                        self.check_case(guild_id, case_id).await;
                    }
                    Some(CaseCheckRequest::Shutdown) | None => break,
                },
                _ = ticker.tick() => self.sweep().await,
            }
        }

        info!(target: CASE_TARGET, "Case sweep task shut down");
    }

    /// Expire everything past due.
    async fn sweep(&self) {
        let due = match self.store.due(Utc::now()).await {
            Ok(due) => due,
            Err(err) => {
                error!(target: CASE_TARGET, error = %err, "Sweep could not read due cases");
                return;
            }
        };

        for case in due {
            if let Err(err) = self.expire(case.guild_id, case.case_id).await {
                error!(
                    target: CASE_TARGET,
                    guild_id = %case.guild_id,
                    case_id = %case.case_id,
                    error = %err,
                    "Failed to expire due case"
                );
            }
        }
    }

    async fn check_case(&self, guild_id: u64, case_id: u64) {
        match self.store.get(guild_id, case_id).await {
            Ok(Some(case)) if case.is_due(Utc::now()) => {
                if let Err(err) = self.expire(guild_id, case_id).await {
                    error!(
                        target: CASE_TARGET,
                        guild_id = %guild_id,
                        case_id = %case_id,
                        error = %err,
                        "Failed to expire checked case"
                    );
                }
            }
            Ok(_) => {}
            Err(err) => {
                error!(
                    target: CASE_TARGET,
                    guild_id = %guild_id,
                    case_id = %case_id,
                    error = %err,
                    "Failed to read case for check"
                );
            }
        }
    }

    async fn notify(&self, request: CaseCheckRequest) {
        if let Some(tx) = self.notifier.get() {
            if tx.send(request).await.is_err() {
                debug!(target: CASE_TARGET, "Sweep task is gone; skipping notification");
            }
        }
    }
}
