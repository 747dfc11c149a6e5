//! Link callback
//!
//! Web half of the linking protocol: the user follows the link prompt, signs
//! in to their ledger account, and the web side calls [`LinkCallback::complete`]
//! with the token from the URL and the authenticated account.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::Error as InfraError;
use crate::types::{AccountId, ActorId};

use super::accounts::AccountLinks;
use super::tokens::{fingerprint, TokenStore};

/// Errors surfaced to the link-callback caller
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid or expired link")]
    TokenExpiredOrInvalid,

    #[error("Linking failed: {0}")]
    Store(#[from] InfraError),
}

/// Completes account links from consumed tokens
pub struct LinkCallback {
    tokens: Arc<TokenStore>,
    links: Arc<dyn AccountLinks>,
}

impl LinkCallback {
    pub fn new(tokens: Arc<TokenStore>, links: Arc<dyn AccountLinks>) -> Self {
        Self { tokens, links }
    }

    /// Consume `token` and link its actor to `account`.
    ///
    /// The token is spent even if the link write fails; the user has to
    /// request a new link in that case.
    pub async fn complete(&self, token: &str, account: &AccountId) -> Result<ActorId, LinkError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(LinkError::TokenExpiredOrInvalid);
        }

        let Some(actor) = self.tokens.consume(token) else {
            warn!(token = %fingerprint(token), "Rejected link callback with unknown or expired token");
            return Err(LinkError::TokenExpiredOrInvalid);
        };

        self.links.link(&actor, account).await?;
        info!(actor = %actor, account = %account.short(), "Link callback completed");
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::link::accounts::MemoryAccountLinks;
    use chrono::Duration;

    fn setup() -> (LinkCallback, Arc<TokenStore>, Arc<MemoryAccountLinks>, ManualClock) {
        let clock = ManualClock::at_unix(1_700_000_000);
        let tokens = Arc::new(TokenStore::in_memory(Arc::new(clock.clone()), Duration::hours(1)));
        let links = Arc::new(MemoryAccountLinks::new());
        let callback = LinkCallback::new(tokens.clone(), links.clone());
        (callback, tokens, links, clock)
    }

    #[tokio::test]
    async fn test_complete_links_actor() {
        let (callback, tokens, links, _) = setup();
        let actor = ActorId::new("alice");
        let issued = tokens.issue(&actor);

        let linked = callback.complete(&issued.token, &AccountId::new("GA1")).await.unwrap();
        assert_eq!(linked, actor);
        assert_eq!(links.get_link(&actor).await.unwrap(), Some(AccountId::new("GA1")));
    }

    #[tokio::test]
    async fn test_replayed_token_rejected() {
        let (callback, tokens, _, _) = setup();
        let issued = tokens.issue(&ActorId::new("alice"));

        callback.complete(&issued.token, &AccountId::new("GA1")).await.unwrap();
        let replay = callback.complete(&issued.token, &AccountId::new("GEVIL")).await;
        assert!(matches!(replay, Err(LinkError::TokenExpiredOrInvalid)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (callback, tokens, links, clock) = setup();
        let actor = ActorId::new("alice");
        let issued = tokens.issue(&actor);

        clock.advance(Duration::minutes(61));
        let result = callback.complete(&issued.token, &AccountId::new("GA1")).await;
        assert!(matches!(result, Err(LinkError::TokenExpiredOrInvalid)));
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let (callback, _, _, _) = setup();
        let result = callback.complete("  ", &AccountId::new("GA1")).await;
        assert!(matches!(result, Err(LinkError::TokenExpiredOrInvalid)));
    }
}
