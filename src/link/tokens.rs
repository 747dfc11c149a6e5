//! Single-use link tokens
//!
//! A token proves the right to complete the web half of the linking flow for
//! one actor. It expires one hour after issue and can be consumed once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::clock::SharedClock;
use crate::store::{sweep_handle, MemoryStore, Sweep, TtlStore};
use crate::types::ActorId;

/// Random bytes per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Issued token record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub token: String,
    pub actor: ActorId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and consumes link tokens
pub struct TokenStore {
    store: Arc<dyn TtlStore<LinkToken>>,
    clock: SharedClock,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(store: Arc<dyn TtlStore<LinkToken>>, clock: SharedClock, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// In-memory store with the given TTL
    pub fn in_memory(clock: SharedClock, ttl: Duration) -> Self {
        let store: Arc<dyn TtlStore<LinkToken>> = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(store, clock, ttl)
    }

    /// Issue a fresh token for `actor`
    pub fn issue(&self, actor: &ActorId) -> LinkToken {
        let token = generate_token();
        let issued_at = self.clock.now();
        let record = LinkToken {
            token: token.clone(),
            actor: actor.clone(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        self.store.set(&token, record.clone(), Some(self.ttl));
        debug!(actor = %actor, token = %fingerprint(&token), "Issued link token");
        record
    }

    /// Consume a token, returning the actor it was issued to.
    ///
    /// Absent when unknown, already consumed, or past `expires_at`.
    pub fn consume(&self, token: &str) -> Option<ActorId> {
        let now = self.clock.now();
        let record = self.store.take_if(token, &|record| now <= record.expires_at)?;
        debug!(actor = %record.actor, token = %fingerprint(token), "Consumed link token");
        Some(record.actor)
    }

    /// Stored tokens, including expired ones not yet swept
    pub fn outstanding(&self) -> usize {
        self.store.len()
    }

    /// Sweep handle for the background sweeper
    pub fn sweeper(&self) -> Arc<dyn Sweep> {
        sweep_handle(self.store.clone())
    }
}

/// 256-bit random token, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short non-reversible identifier for logging a secret value
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashSet;

    fn tokens() -> (TokenStore, ManualClock) {
        let clock = ManualClock::at_unix(1_700_000_000);
        let store = TokenStore::in_memory(
            Arc::new(clock.clone()),
            Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        );
        (store, clock)
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let seen: HashSet<_> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_consume_exactly_once() {
        let (store, _) = tokens();
        let actor = ActorId::new("alice");
        let issued = store.issue(&actor);

        assert_eq!(store.consume(&issued.token), Some(actor));
        assert_eq!(store.consume(&issued.token), None);
    }

    #[test]
    fn test_expiry_is_absolute() {
        let (store, clock) = tokens();
        let issued = store.issue(&ActorId::new("alice"));
        assert_eq!(issued.expires_at - issued.issued_at, Duration::hours(1));

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(store.consume(&issued.token), None);
    }

    #[test]
    fn test_consume_at_expiry_boundary() {
        let (store, clock) = tokens();
        let issued = store.issue(&ActorId::new("alice"));
        clock.set(issued.expires_at);
        assert!(store.consume(&issued.token).is_some());
    }

    #[test]
    fn test_unknown_token() {
        let (store, _) = tokens();
        assert_eq!(store.consume("deadbeef"), None);
    }

    #[test]
    fn test_fingerprint_hides_token() {
        let token = generate_token();
        let fp = fingerprint(&token);
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, fingerprint(&token));
        assert_ne!(fp, fingerprint(&generate_token()));
    }
}
