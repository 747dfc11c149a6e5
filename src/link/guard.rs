//! Link guard
//!
//! First check of every command that needs a linked account. Unlinked actors
//! get a fresh link prompt instead of reaching any downstream logic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{AccountId, ActorId};

use super::accounts::AccountLinks;
use super::tokens::{fingerprint, TokenStore};

/// Actionable "link your account" prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPrompt {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a link check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Actor is linked to this account
    Linked(AccountId),
    /// Actor is not linked; a fresh prompt was issued
    Unlinked(LinkPrompt),
}

impl LinkStatus {
    pub fn is_linked(&self) -> bool {
        matches!(self, LinkStatus::Linked(_))
    }
}

/// Composes the account link store with the token store
pub struct LinkGuard {
    links: Arc<dyn AccountLinks>,
    tokens: Arc<TokenStore>,
    base_url: Url,
}

impl LinkGuard {
    /// Create a guard issuing prompts under `base_url`
    pub fn new(links: Arc<dyn AccountLinks>, tokens: Arc<TokenStore>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid link base URL {}: {}", base_url, e)))?;
        Ok(Self {
            links,
            tokens,
            base_url,
        })
    }

    /// Check linkage, issuing a new token and prompt when unlinked.
    ///
    /// Linked actors cause no side effect.
    pub async fn require_link(&self, actor: &ActorId) -> Result<LinkStatus> {
        if let Some(account) = self.links.get_link(actor).await? {
            debug!(actor = %actor, account = %account.short(), "Link check passed");
            return Ok(LinkStatus::Linked(account));
        }

        let prompt = self.prompt(actor);
        info!(actor = %actor, token = %fingerprint(&prompt.token), "Actor not linked, issued link prompt");
        Ok(LinkStatus::Unlinked(prompt))
    }

    /// Linked account without issuing anything
    pub async fn linked_account(&self, actor: &ActorId) -> Result<Option<AccountId>> {
        self.links.get_link(actor).await
    }

    /// Issue a link prompt unconditionally
    pub fn prompt(&self, actor: &ActorId) -> LinkPrompt {
        let issued = self.tokens.issue(actor);
        LinkPrompt {
            url: self.link_url(&issued.token),
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }

    /// `base_url?token=<token>`
    pub fn link_url(&self, token: &str) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().clear().append_pair("token", token);
        url.to_string()
    }

    pub fn links(&self) -> &Arc<dyn AccountLinks> {
        &self.links
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::link::accounts::MemoryAccountLinks;
    use chrono::Duration;

    fn guard() -> (LinkGuard, Arc<MemoryAccountLinks>, Arc<TokenStore>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let links = Arc::new(MemoryAccountLinks::new());
        let tokens = Arc::new(TokenStore::in_memory(clock, Duration::hours(1)));
        let guard = LinkGuard::new(
            links.clone(),
            tokens.clone(),
            "https://stellar-exchange.com/auth/discord",
        )
        .unwrap();
        (guard, links, tokens)
    }

    #[tokio::test]
    async fn test_unlinked_actor_gets_prompt() {
        let (guard, _, tokens) = guard();
        let actor = ActorId::new("alice");

        let status = guard.require_link(&actor).await.unwrap();
        assert!(!status.is_linked());
        let prompt = match status {
            LinkStatus::Unlinked(prompt) => prompt,
            other => panic!("expected prompt, got {:?}", other),
        };

        assert_eq!(
            prompt.url,
            format!("https://stellar-exchange.com/auth/discord?token={}", prompt.token)
        );
        assert_eq!(tokens.consume(&prompt.token), Some(actor));
    }

    #[tokio::test]
    async fn test_each_unlinked_check_issues_distinct_token() {
        let (guard, _, _) = guard();
        let actor = ActorId::new("alice");

        let first = guard.require_link(&actor).await.unwrap();
        let second = guard.require_link(&actor).await.unwrap();
        match (first, second) {
            (LinkStatus::Unlinked(a), LinkStatus::Unlinked(b)) => assert_ne!(a.token, b.token),
            other => panic!("expected two prompts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_linked_actor_passes_without_token() {
        let (guard, links, tokens) = guard();
        let actor = ActorId::new("alice");
        links.link(&actor, &AccountId::new("GA1")).await.unwrap();

        let status = guard.require_link(&actor).await.unwrap();
        assert_eq!(status, LinkStatus::Linked(AccountId::new("GA1")));
        assert!(status.is_linked());

        assert_eq!(tokens.outstanding(), 0);
    }

    #[test]
    fn test_link_url_replaces_existing_query() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let guard = LinkGuard::new(
            Arc::new(MemoryAccountLinks::new()),
            Arc::new(TokenStore::in_memory(clock, Duration::hours(1))),
            "https://example.com/link?token=stale",
        )
        .unwrap();
        assert_eq!(guard.link_url("abc"), "https://example.com/link?token=abc");
    }

    #[test]
    fn test_invalid_base_url() {
        let clock = Arc::new(ManualClock::at_unix(0));
        let result = LinkGuard::new(
            Arc::new(MemoryAccountLinks::new()),
            Arc::new(TokenStore::in_memory(clock, Duration::hours(1))),
            "not a url",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
