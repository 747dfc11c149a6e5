//! Replies and the channel that delivers them

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::link::LinkPrompt;
use crate::types::ActorId;

/// Actionable link rendered as a button by chat front ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Response to a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// Visible only to the invoking actor
    pub ephemeral: bool,
    pub button: Option<LinkButton>,
}

impl Reply {
    /// Actor-only reply
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            button: None,
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.button = Some(LinkButton {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    /// "Connect Account" reply for a link prompt
    pub fn link_prompt(content: impl Into<String>, prompt: &LinkPrompt) -> Self {
        Self::ephemeral(content).with_button("Connect Account", prompt.url.clone())
    }

    /// Plain-text rendering for terminals and logs
    pub fn render(&self) -> String {
        match &self.button {
            Some(button) => format!("{}\n[{}] {}", self.content, button.label, button.url),
            None => self.content.clone(),
        }
    }
}

#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn send(&self, actor: &ActorId, reply: &Reply) -> Result<()>;
}

/// Writes replies to stdout
pub struct ConsoleReplyChannel {
    out: Mutex<Stdout>,
}

impl ConsoleReplyChannel {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleReplyChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyChannel for ConsoleReplyChannel {
    async fn send(&self, actor: &ActorId, reply: &Reply) -> Result<()> {
        let visibility = if reply.ephemeral { " (only you)" } else { "" };
        let text = format!("[to {}{}] {}\n", actor, visibility, reply.render());

        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes())
            .await
            .map_err(|e| Error::ReplyDelivery(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| Error::ReplyDelivery(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_button() {
        let reply = Reply::ephemeral("Link first").with_button("Connect Account", "https://x/auth?token=t");
        assert_eq!(reply.render(), "Link first\n[Connect Account] https://x/auth?token=t");
        assert!(reply.ephemeral);
    }

    #[test]
    fn test_render_plain() {
        assert_eq!(Reply::ephemeral("❌ Unknown command.").render(), "❌ Unknown command.");
    }
}
