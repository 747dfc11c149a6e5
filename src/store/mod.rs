//! Expiring key-value stores
//!
//! All ephemeral state (link tokens, email codes, cooldowns, pending
//! confirmations) lives behind [`TtlStore`]. The in-memory backend is a
//! [`DashMap`]; a durable backend only has to provide the same atomic
//! operations.
//!
//! An expired entry is treated as absent by every read even if the sweeper
//! has not removed it yet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock::SharedClock;

/// Periodic cleanup hook, object safe so heterogeneous stores can share a sweeper
pub trait Sweep: Send + Sync {
    /// Physically remove expired entries, returning how many were dropped
    fn sweep_expired(&self) -> usize;
}

/// Keyed store with optional per-entry TTL
///
/// Operations that combine a read with a conditional write are single atomic
/// calls so two concurrent callers can never both observe the same entry.
pub trait TtlStore<V>: Sweep {
    /// Read a live entry
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or overwrite an entry
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Insert or overwrite, returning the previous live value
    fn swap(&self, key: &str, value: V, ttl: Option<Duration>) -> Option<V>;

    /// Atomically get and remove a live entry
    fn take(&self, key: &str) -> Option<V>;

    /// Atomically remove a live entry only if `pred` accepts it
    fn take_if(&self, key: &str, pred: &dyn Fn(&V) -> bool) -> Option<V>;

    /// Atomically write `value` only if `pred` accepts the current live value
    /// (`None` when absent or expired). Returns whether the write happened.
    fn replace_if(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        pred: &dyn Fn(Option<&V>) -> bool,
    ) -> bool;

    /// Remove an entry, returning whether a live one was present
    fn remove(&self, key: &str) -> bool;

    /// Whether a live entry exists
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of physically stored entries (may include expired ones)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry with absolute expiry
#[derive(Debug, Clone)]
struct StoredEntry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> StoredEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }
}

/// In-memory [`TtlStore`] over a concurrent hashmap
pub struct MemoryStore<V> {
    entries: DashMap<String, StoredEntry<V>>,
    clock: SharedClock,
    swept: AtomicU64,
}

impl<V> MemoryStore<V> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            swept: AtomicU64::new(0),
        }
    }

    /// Total entries removed by sweeps since creation
    pub fn swept_total(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    fn entry_for(&self, value: V, ttl: Option<Duration>) -> StoredEntry<V> {
        StoredEntry {
            value,
            expires_at: ttl.map(|ttl| self.clock.now() + ttl),
        }
    }
}

impl<V: Send + Sync> Sweep for MemoryStore<V> {
    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        self.swept.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

impl<V: Clone + Send + Sync> TtlStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let entry = self.entry_for(value, ttl);
        self.entries.insert(key.to_string(), entry);
    }

    fn swap(&self, key: &str, value: V, ttl: Option<Duration>) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entry_for(value, ttl);
        self.entries
            .insert(key.to_string(), entry)
            .filter(|old| !old.is_expired(now))
            .map(|old| old.value)
    }

    fn take(&self, key: &str) -> Option<V> {
        self.take_if(key, &|_| true)
    }

    fn take_if(&self, key: &str, pred: &dyn Fn(&V) -> bool) -> Option<V> {
        let now = self.clock.now();
        let taken = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && pred(&entry.value))
            .map(|(_, entry)| entry.value);

        if taken.is_none() {
            // Opportunistically drop a dead entry under the same key
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        taken
    }

    fn replace_if(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        pred: &dyn Fn(Option<&V>) -> bool,
    ) -> bool {
        let now = self.clock.now();
        let entry = self.entry_for(value, ttl);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let allowed = {
                    let current = occupied.get();
                    if current.is_expired(now) {
                        pred(None)
                    } else {
                        pred(Some(&current.value))
                    }
                };
                if allowed {
                    occupied.insert(entry);
                }
                allowed
            }
            Entry::Vacant(vacant) => {
                let allowed = pred(None);
                if allowed {
                    vacant.insert(entry);
                }
                allowed
            }
        }
    }

    fn remove(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct SweepHandle<V>(Arc<dyn TtlStore<V>>);

impl<V> Sweep for SweepHandle<V> {
    fn sweep_expired(&self) -> usize {
        self.0.sweep_expired()
    }
}

/// Wrap a shared store so it can be registered with [`spawn_sweeper`]
pub fn sweep_handle<V: 'static>(store: Arc<dyn TtlStore<V>>) -> Arc<dyn Sweep> {
    Arc::new(SweepHandle(store))
}

/// Spawn a background task that sweeps every store on a fixed interval
pub fn spawn_sweeper(
    stores: Vec<(&'static str, Arc<dyn Sweep>)>,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for (name, store) in &stores {
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(store = name, removed, "Swept expired entries");
                }
            }
        }
    })
}
