//! Explicit confirmation step for sensitive actions
//!
//! At most one action is pending per actor. A new request replaces the old
//! one; taking it removes it.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::clock::SharedClock;
use crate::store::{sweep_handle, MemoryStore, Sweep, TtlStore};
use crate::types::ActorId;

/// How long an unconfirmed action stays pending
pub const DEFAULT_PENDING_TTL_SECS: i64 = 300;

pub struct ConfirmationGate<A> {
    pending: Arc<dyn TtlStore<A>>,
    ttl: Duration,
}

impl<A: Clone + Send + Sync + 'static> ConfirmationGate<A> {
    pub fn new(pending: Arc<dyn TtlStore<A>>, ttl: Duration) -> Self {
        Self { pending, ttl }
    }

    pub fn in_memory(clock: SharedClock) -> Self {
        let pending: Arc<dyn TtlStore<A>> = Arc::new(MemoryStore::new(clock));
        Self::new(pending, Duration::seconds(DEFAULT_PENDING_TTL_SECS))
    }

    /// Park `action` for `actor`, replacing any earlier one
    pub fn request_confirmation(&self, actor: &ActorId, action: A) {
        let replaced = self
            .pending
            .swap(actor.as_str(), action, Some(self.ttl))
            .is_some();
        debug!(actor = %actor, replaced, "Action awaiting confirmation");
    }

    pub fn is_pending(&self, actor: &ActorId) -> bool {
        self.pending.contains(actor.as_str())
    }

    /// Atomically take the pending action
    pub fn take_confirmed(&self, actor: &ActorId) -> Option<A> {
        self.pending.take(actor.as_str())
    }

    /// Drop a pending action without running it
    pub fn cancel(&self, actor: &ActorId) -> bool {
        self.pending.remove(actor.as_str())
    }

    pub fn sweeper(&self) -> Arc<dyn Sweep> {
        sweep_handle(self.pending.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn gate() -> (ConfirmationGate<String>, ManualClock) {
        let clock = ManualClock::at_unix(1_700_000_000);
        (ConfirmationGate::in_memory(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_take_once() {
        let (gate, _) = gate();
        let actor = ActorId::new("alice");

        gate.request_confirmation(&actor, "transfer 500".into());
        assert!(gate.is_pending(&actor));
        assert_eq!(gate.take_confirmed(&actor).as_deref(), Some("transfer 500"));
        assert!(gate.take_confirmed(&actor).is_none());
        assert!(!gate.is_pending(&actor));
    }

    #[test]
    fn test_request_overwrites() {
        let (gate, _) = gate();
        let actor = ActorId::new("alice");

        gate.request_confirmation(&actor, "first".into());
        gate.request_confirmation(&actor, "second".into());
        assert_eq!(gate.take_confirmed(&actor).as_deref(), Some("second"));
        assert!(gate.take_confirmed(&actor).is_none());
    }

    #[test]
    fn test_pending_action_expires() {
        let (gate, clock) = gate();
        let actor = ActorId::new("alice");

        gate.request_confirmation(&actor, "stale".into());
        clock.advance(Duration::minutes(6));
        assert!(!gate.is_pending(&actor));
        assert!(gate.take_confirmed(&actor).is_none());
    }

    #[test]
    fn test_cancel() {
        let (gate, _) = gate();
        let actor = ActorId::new("alice");
        gate.request_confirmation(&actor, "x".into());
        assert!(gate.cancel(&actor));
        assert!(!gate.cancel(&actor));
    }

    #[test]
    fn test_concurrent_take_single_winner() {
        let (gate, _) = gate();
        let gate = Arc::new(gate);
        let actor = ActorId::new("alice");
        gate.request_confirmation(&actor, "once".into());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let actor = actor.clone();
                std::thread::spawn(move || gate.take_confirmed(&actor).is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
