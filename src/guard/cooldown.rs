//! Per-actor cooldown between sensitive actions

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::clock::SharedClock;
use crate::store::{sweep_handle, MemoryStore, Sweep, TtlStore};
use crate::types::ActorId;

/// Longest accepted cooldown window (one day)
pub const MAX_WINDOW_MS: u64 = 86_400_000;

fn window_duration(window_ms: u64) -> Duration {
    // Bounded, so the cast and the expiry arithmetic cannot overflow
    Duration::milliseconds(window_ms.min(MAX_WINDOW_MS) as i64)
}

/// When the last-action timestamp is refreshed
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// Only a passing check refreshes the timestamp
    #[default]
    UpdateOnPass,
    /// Every check refreshes it, so retrying inside the window extends it
    UpdateOnAttempt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub policy: CooldownPolicy,
}

fn default_window_ms() -> u64 {
    10_000
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            policy: CooldownPolicy::default(),
        }
    }
}

/// Enforces a minimum interval between actions of the same actor
pub struct CooldownLimiter {
    last_action: Arc<dyn TtlStore<DateTime<Utc>>>,
    clock: SharedClock,
    policy: CooldownPolicy,
}

impl CooldownLimiter {
    pub fn new(
        last_action: Arc<dyn TtlStore<DateTime<Utc>>>,
        clock: SharedClock,
        policy: CooldownPolicy,
    ) -> Self {
        Self {
            last_action,
            clock,
            policy,
        }
    }

    pub fn in_memory(clock: SharedClock, policy: CooldownPolicy) -> Self {
        let store: Arc<dyn TtlStore<DateTime<Utc>>> = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(store, clock, policy)
    }

    /// Allow the action if at least `window_ms` passed since the last one.
    ///
    /// Entries expire once their window is over, so the sweeper can drop
    /// idle actors.
    pub fn check(&self, actor: &ActorId, window_ms: u64) -> bool {
        let now = self.clock.now();
        let window = window_duration(window_ms);
        let outside_window = |last: Option<&DateTime<Utc>>| match last {
            Some(last) => now.signed_duration_since(*last) >= window,
            None => true,
        };

        let allowed = match self.policy {
            CooldownPolicy::UpdateOnPass => {
                self.last_action
                    .replace_if(actor.as_str(), now, Some(window), &outside_window)
            }
            CooldownPolicy::UpdateOnAttempt => {
                let previous = self.last_action.swap(actor.as_str(), now, Some(window));
                outside_window(previous.as_ref())
            }
        };

        debug!(actor = %actor, allowed, window_ms, "Cooldown check");
        allowed
    }

    /// Time left in the current window, if any
    pub fn remaining(&self, actor: &ActorId, window_ms: u64) -> Option<std::time::Duration> {
        let last = self.last_action.get(actor.as_str())?;
        let elapsed = self.clock.now().signed_duration_since(last);
        let left = window_duration(window_ms) - elapsed;
        if left > Duration::zero() {
            left.to_std().ok()
        } else {
            None
        }
    }

    pub fn sweeper(&self) -> Arc<dyn Sweep> {
        sweep_handle(self.last_action.clone())
    }
}
