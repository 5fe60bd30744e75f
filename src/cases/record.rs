//! Moderation case records
//!
//! A case is the durable record of one disciplinary action. Records are
//! only ever mutated through the engine's transition operations; command
//! handlers never edit them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::CASE_TARGET;

/// The disciplinary action a case records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum ActionKind {
    #[display("warn")]
    Warn,
    #[display("mute")]
    Mute,
    #[display("ban")]
    Ban,
    #[display("kick")]
    Kick,
    #[display("unban")]
    Unban,
}

impl ActionKind {
    /// Whether expiry of this action performs a platform-side reversal
    /// (unmute, unban). Point-in-time actions have nothing to reverse.
    #[must_use]
    pub fn reversible(self) -> bool {
        matches!(self, Self::Mute | Self::Ban)
    }
}

/// Durable record of a disciplinary action and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationCase {
    /// Guild the case belongs to
    pub guild_id: u64,
    /// Sequential per-guild id, allocated by the store
    pub case_id: u64,
    /// Actor the action was taken against
    pub target_id: u64,
    /// Actor who took the action
    pub moderator_id: u64,
    /// What was done
    pub kind: ActionKind,
    /// Why, as given by the moderator
    pub reason: String,
    /// When the case was opened
    pub created_at: DateTime<Utc>,
    /// When a temporary action lapses. `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the case is still in force
    pub active: bool,
    /// When the case left force, if it has
    pub closed_at: Option<DateTime<Utc>>,
    /// Why the case was closed, for administrative closes
    pub resolution: Option<String>,
}

impl ModerationCase {
    pub fn new(
        guild_id: u64,
        case_id: u64,
        target_id: u64,
        moderator_id: u64,
        kind: ActionKind,
        reason: impl Into<String>,
        duration: Option<Duration>,
    ) -> Self {
        let created_at = Utc::now();
        // A duration past the calendar's range degrades to permanent.
        let expires_at = duration.and_then(|duration| {
            chrono::Duration::from_std(duration)
                .ok()
                .and_then(|delta| created_at.checked_add_signed(delta))
        });

        Self {
            guild_id,
            case_id,
            target_id,
            moderator_id,
            kind,
            reason: reason.into(),
            created_at,
            expires_at,
            active: true,
            closed_at: None,
            resolution: None,
        }
    }

    /// Whether the action lapses on its own.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Whether the case is in force and past its expiry.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Take the case out of force. Returns `false` when it already was,
    /// so the flip happens at most once per record.
    pub fn deactivate(&mut self, resolution: Option<String>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.closed_at = Some(Utc::now());
        self.resolution = resolution;

        info!(
            target: CASE_TARGET,
            guild_id = %self.guild_id,
            case_id = %self.case_id,
            target_id = %self.target_id,
            kind = %self.kind,
            "Case deactivated"
        );
        true
    }
}
