//! Per-(actor, command) cooldown tracking
//!
//! The check is an atomic check-and-set on the shard-locked map entry:
//! two racing invocations from the same actor can never both pass the
//! same window. The start of a cooldown is recorded before handler
//! execution begins, so a slow handler cannot be double-fired.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::{Duration, Instant};

/// Tracks the most recent accepted invocation per (actor, command).
#[derive(Default)]
pub struct CooldownTracker {
    slots: DashMap<(u64, String), Instant>,
}

impl CooldownTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Claim the cooldown slot for `(actor_id, command)`.
    ///
    /// Returns `Ok(())` and records the new window start when the actor
    /// is clear to proceed, or `Err(remaining)` when the previous window
    /// is still open. A zero-length window never blocks.
    pub fn try_acquire(
        &self,
        actor_id: u64,
        command: &str,
        window: Duration,
    ) -> Result<(), Duration> {
        if window.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        match self.slots.entry((actor_id, command.to_owned())) {
            Entry::Occupied(mut occupied) => {
                let elapsed = now.duration_since(*occupied.get());
                if elapsed < window {
                    Err(window - elapsed)
                } else {
                    occupied.insert(now);
                    Ok(())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn test_second_invocation_inside_window_is_blocked() {
        let cooldowns = CooldownTracker::new();

        assert!(cooldowns.try_acquire(1, "ban", WINDOW).is_ok());
        let remaining = cooldowns.try_acquire(1, "ban", WINDOW).unwrap_err();
        assert!(remaining <= WINDOW);
        assert!(remaining > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens_after_elapsing() {
        let cooldowns = CooldownTracker::new();

        assert!(cooldowns.try_acquire(1, "ban", WINDOW).is_ok());
        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;
        assert!(cooldowns.try_acquire(1, "ban", WINDOW).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_scoped_per_actor_and_command() {
        let cooldowns = CooldownTracker::new();

        assert!(cooldowns.try_acquire(1, "ban", WINDOW).is_ok());
        assert!(cooldowns.try_acquire(2, "ban", WINDOW).is_ok());
        assert!(cooldowns.try_acquire(1, "kick", WINDOW).is_ok());
        assert!(cooldowns.try_acquire(1, "ban", WINDOW).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_never_blocks() {
        let cooldowns = CooldownTracker::new();
        for _ in 0..3 {
            assert!(cooldowns.try_acquire(1, "ping", Duration::ZERO).is_ok());
        }
    }

    #[test]
    fn test_concurrent_acquires_admit_exactly_one() {
        let cooldowns = Arc::new(CooldownTracker::new());
        let admitted = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cooldowns = Arc::clone(&cooldowns);
                let admitted = Arc::clone(&admitted);
                scope.spawn(move || {
                    if cooldowns.try_acquire(1, "warn", WINDOW).is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
