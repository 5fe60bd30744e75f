//! Case persistence seam and the in-memory store
//!
//! [`CaseStore`] is the narrow interface to the persistence
//! collaborator. [`MemoryCaseStore`] is the shipped implementation: a
//! `DashMap` keyed by (guild, case id) with shard-locked per-guild
//! sequences, which also serves as the test double.

use crate::cases::error::{CaseError, CaseResult};
use crate::cases::record::{ActionKind, ModerationCase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Query filter for case listings. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFilter {
    pub target_id: Option<u64>,
    pub moderator_id: Option<u64>,
    pub kind: Option<ActionKind>,
    pub active: Option<bool>,
}

impl CaseFilter {
    #[must_use]
    pub fn target(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    #[must_use]
    pub fn moderator(mut self, moderator_id: u64) -> Self {
        self.moderator_id = Some(moderator_id);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    #[must_use]
    pub fn matches(&self, case: &ModerationCase) -> bool {
        self.target_id.is_none_or(|id| case.target_id == id)
            && self.moderator_id.is_none_or(|id| case.moderator_id == id)
            && self.kind.is_none_or(|kind| case.kind == kind)
            && self.active.is_none_or(|active| case.active == active)
    }
}

/// Narrow interface to the persistence collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Allocate the next case id for a guild. Allocation is linearized
    /// per guild: concurrent callers never see the same id, and ids form
    /// a contiguous sequence starting from 1.
    async fn next_case_id(&self, guild_id: u64) -> CaseResult<u64>;

    /// Persist a fully-built case in one atomic write: after an error
    /// or a cancellation, no partial record exists.
    async fn insert(&self, case: ModerationCase) -> CaseResult<()>;

    async fn get(&self, guild_id: u64, case_id: u64) -> CaseResult<Option<ModerationCase>>;

    /// Atomically take a case out of force. Returns the updated record,
    /// or `None` when the case was already inactive; exactly one of
    /// any number of concurrent callers sees the record.
    async fn deactivate(
        &self,
        guild_id: u64,
        case_id: u64,
        resolution: Option<String>,
    ) -> CaseResult<Option<ModerationCase>>;

    /// Cases matching the filter, newest first.
    async fn list(&self, guild_id: u64, filter: CaseFilter) -> CaseResult<Vec<ModerationCase>>;

    /// Active temporary cases whose expiry has passed.
    async fn due(&self, now: DateTime<Utc>) -> CaseResult<Vec<ModerationCase>>;
}

/// In-memory store for case records
pub struct MemoryCaseStore {
    cases: DashMap<(u64, u64), ModerationCase>,
    sequences: DashMap<u64, u64>,
}

impl Default for MemoryCaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cases: DashMap::new(),
            sequences: DashMap::new(),
        }
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn next_case_id(&self, guild_id: u64) -> CaseResult<u64> {
        // entry() holds the shard lock across the read-modify-write
        let mut sequence = self.sequences.entry(guild_id).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn insert(&self, case: ModerationCase) -> CaseResult<()> {
        match self.cases.entry((case.guild_id, case.case_id)) {
            Entry::Vacant(vacant) => {
                vacant.insert(case);
                Ok(())
            }
            Entry::Occupied(occupied) => {
                let (guild_id, case_id) = *occupied.key();
                Err(CaseError::Persistence(format!(
                    "case #{case_id} already exists in guild {guild_id}"
                )))
            }
        }
    }

    async fn get(&self, guild_id: u64, case_id: u64) -> CaseResult<Option<ModerationCase>> {
        Ok(self
            .cases
            .get(&(guild_id, case_id))
            .map(|entry| entry.value().clone()))
    }

    async fn deactivate(
        &self,
        guild_id: u64,
        case_id: u64,
        resolution: Option<String>,
    ) -> CaseResult<Option<ModerationCase>> {
        let Some(mut entry) = self.cases.get_mut(&(guild_id, case_id)) else {
            return Err(CaseError::NotFound { guild_id, case_id });
        };
        if entry.deactivate(resolution) {
            Ok(Some(entry.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn list(&self, guild_id: u64, filter: CaseFilter) -> CaseResult<Vec<ModerationCase>> {
        let mut matched: Vec<ModerationCase> = self
            .cases
            .iter()
            .filter(|entry| entry.key().0 == guild_id && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.case_id.cmp(&a.case_id))
        });
        Ok(matched)
    }

    async fn due(&self, now: DateTime<Utc>) -> CaseResult<Vec<ModerationCase>> {
        Ok(self
            .cases
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn case(guild_id: u64, case_id: u64, target_id: u64, kind: ActionKind) -> ModerationCase {
        ModerationCase::new(guild_id, case_id, target_id, 99, kind, "test", None)
    }

    #[tokio::test]
    async fn test_sequences_start_at_one_and_are_contiguous() {
        let store = MemoryCaseStore::new();
        assert_eq!(store.next_case_id(1).await.unwrap(), 1);
        assert_eq!(store.next_case_id(1).await.unwrap(), 2);
        assert_eq!(store.next_case_id(2).await.unwrap(), 1);
        assert_eq!(store.next_case_id(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_allocation_is_linearized_per_guild() {
        let store = Arc::new(MemoryCaseStore::new());

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(
                async move { store.next_case_id(1).await.unwrap() },
            ));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort_unstable();
        let expected: Vec<u64> = (1..=32).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let store = MemoryCaseStore::new();
        store.insert(case(1, 1, 10, ActionKind::Warn)).await.unwrap();

        let err = store
            .insert(case(1, 1, 11, ActionKind::Kick))
            .await
            .unwrap_err();
        assert!(matches!(err, CaseError::Persistence(_)));

        // The original record is untouched.
        let stored = store.get(1, 1).await.unwrap().unwrap();
        assert_eq!(stored.target_id, 10);
    }

    #[tokio::test]
    async fn test_deactivate_flips_once() {
        let store = MemoryCaseStore::new();
        store.insert(case(1, 1, 10, ActionKind::Mute)).await.unwrap();

        let flipped = store.deactivate(1, 1, None).await.unwrap();
        assert!(flipped.is_some_and(|case| !case.active));

        assert!(store.deactivate(1, 1, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivate_missing_case() {
        let store = MemoryCaseStore::new();
        let err = store.deactivate(1, 7, None).await.unwrap_err();
        assert!(matches!(
            err,
            CaseError::NotFound {
                guild_id: 1,
                case_id: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = MemoryCaseStore::new();
        store.insert(case(1, 1, 10, ActionKind::Warn)).await.unwrap();
        store.insert(case(1, 2, 10, ActionKind::Mute)).await.unwrap();
        store.insert(case(1, 3, 11, ActionKind::Warn)).await.unwrap();
        store.insert(case(2, 1, 10, ActionKind::Ban)).await.unwrap();

        let all = store.list(1, CaseFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|c| c.case_id).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );

        let for_target = store
            .list(1, CaseFilter::default().target(10))
            .await
            .unwrap();
        assert_eq!(for_target.len(), 2);

        let warns = store
            .list(1, CaseFilter::default().kind(ActionKind::Warn))
            .await
            .unwrap();
        assert_eq!(warns.len(), 2);

        store.deactivate(1, 2, None).await.unwrap();
        let active = store.list(1, CaseFilter::default().active(true)).await.unwrap();
        assert_eq!(
            active.iter().map(|c| c.case_id).collect::<Vec<_>>(),
            vec![3, 1]
        );
    }

    #[tokio::test]
    async fn test_due_only_returns_lapsed_active_cases() {
        let store = MemoryCaseStore::new();

        let lapsed = ModerationCase::new(
            1,
            1,
            10,
            99,
            ActionKind::Mute,
            "t",
            Some(Duration::ZERO),
        );
        let pending = ModerationCase::new(
            1,
            2,
            11,
            99,
            ActionKind::Mute,
            "t",
            Some(Duration::from_secs(3600)),
        );
        let permanent = case(1, 3, 12, ActionKind::Ban);
        store.insert(lapsed).await.unwrap();
        store.insert(pending).await.unwrap();
        store.insert(permanent).await.unwrap();

        let due = store.due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].case_id, 1);

        store.deactivate(1, 1, None).await.unwrap();
        assert!(store.due(Utc::now()).await.unwrap().is_empty());
    }
}
