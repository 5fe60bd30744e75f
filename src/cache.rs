//! Short-TTL cache with single-flight recomputation
//!
//! Used to avoid redundant collaborator lookups (permission levels in
//! particular). A read past its TTL is treated as absent. At most one
//! recomputation per key is in flight at a time: concurrent callers for
//! the same key await the leader's result instead of duplicating work,
//! and a failed computation propagates to every waiter without leaving
//! a stale entry behind.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

/// Errors surfaced by [`TtlCache::get_or_compute`].
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The compute closure failed; every waiter for the in-flight key
    /// receives the same error.
    #[error("cached computation failed: {0}")]
    Compute(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

enum Slot<V> {
    Ready {
        value: V,
        expires_at: Instant,
    },
    InFlight {
        tx: broadcast::Sender<Result<V, CacheError>>,
        flight: u64,
    },
}

enum Claim<V> {
    Hit(V),
    Wait(broadcast::Receiver<Result<V, CacheError>>),
    Lead {
        tx: broadcast::Sender<Result<V, CacheError>>,
        flight: u64,
    },
}

/// TTL cache keyed by `K`, safe to share across tasks.
pub struct TtlCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    flights: AtomicU64,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            flights: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key` if present and unexpired;
    /// otherwise run `compute` and store its result for `ttl`.
    ///
    /// The single-flight guarantee: with any number of concurrent callers
    /// for one key, `compute` runs once and all callers see its result.
    ///
    /// # Errors
    /// Returns `CacheError::Compute` when the computation fails, for the
    /// leader and every waiter alike.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: K,
        ttl: Duration,
        compute: F,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, crate::Error>>,
    {
        let mut compute = Some(compute);
        loop {
            match self.claim(&key) {
                Claim::Hit(value) => return Ok(value),
                Claim::Wait(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader vanished without publishing; elect a new one.
                    Err(_) => continue,
                },
                Claim::Lead { tx, flight } => {
                    // The lead arm always returns, so this take succeeds.
                    let compute = compute.take().expect("flight led twice");
                    return self.lead(&key, ttl, tx, flight, compute()).await;
                }
            }
        }
    }

    /// Remove the entry for `key` unconditionally. Idempotent. An
    /// in-flight computation still completes and reaches its waiters,
    /// but its result is not stored.
    pub fn invalidate(&self, key: &K) {
        self.slots.remove(key);
    }

    /// Remove every entry whose key matches the predicate.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) {
        self.slots.retain(|key, _| !predicate(key));
    }

    /// Inspect the slot under the shard lock: fresh value, an in-flight
    /// computation to wait on, or leadership of a new flight.
    fn claim(&self, key: &K) -> Claim<V> {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Ready { value, expires_at } if Instant::now() < *expires_at => {
                    Claim::Hit(value.clone())
                }
                Slot::InFlight { tx, .. } => Claim::Wait(tx.subscribe()),
                Slot::Ready { .. } => {
                    let (tx, _) = broadcast::channel(1);
                    let flight = self.flights.fetch_add(1, Ordering::Relaxed);
                    occupied.insert(Slot::InFlight {
                        tx: tx.clone(),
                        flight,
                    });
                    Claim::Lead { tx, flight }
                }
            },
            Entry::Vacant(vacant) => {
                let (tx, _) = broadcast::channel(1);
                let flight = self.flights.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot::InFlight {
                    tx: tx.clone(),
                    flight,
                });
                Claim::Lead { tx, flight }
            }
        }
    }

    async fn lead(
        &self,
        key: &K,
        ttl: Duration,
        tx: broadcast::Sender<Result<V, CacheError>>,
        flight: u64,
        fut: impl Future<Output = Result<V, crate::Error>>,
    ) -> Result<V, CacheError> {
        // If this future is dropped mid-compute the guard releases the
        // slot, letting a waiter take over leadership.
        let mut guard = FlightGuard {
            cache: self,
            key,
            flight,
            armed: true,
        };

        let result = match fut.await {
            Ok(value) => {
                self.settle(
                    key,
                    flight,
                    Some(Slot::Ready {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    }),
                );
                Ok(value)
            }
            Err(err) => {
                self.settle(key, flight, None);
                Err(CacheError::Compute(Arc::from(err)))
            }
        };
        guard.armed = false;

        // Waiters may all be gone; that is fine.
        let _ = tx.send(result.clone());
        result
    }

    /// Replace or remove this flight's slot, but only while the flight
    /// still owns it: an `invalidate` racing the computation wins.
    fn settle(&self, key: &K, flight: u64, replacement: Option<Slot<V>>) {
        match replacement {
            Some(slot) => {
                if let Some(mut entry) = self.slots.get_mut(key) {
                    if matches!(entry.value(), Slot::InFlight { flight: current, .. } if *current == flight)
                    {
                        *entry.value_mut() = slot;
                    }
                }
            }
            None => {
                self.slots.remove_if(key, |_, slot| {
                    matches!(slot, Slot::InFlight { flight: current, .. } if *current == flight)
                });
            }
        }
    }
}

struct FlightGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    cache: &'a TtlCache<K, V>,
    key: &'a K,
    flight: u64,
    armed: bool,
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if self.armed {
            self.cache.settle(self.key, self.flight, None);
        }
    }
}
