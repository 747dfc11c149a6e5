//! Chat command layer
//!
//! Text arrives as `(actor, message)`, gets parsed into an
//! [`Invocation`](parse::Invocation), is routed through the static
//! [`CommandRegistry`](registry::CommandRegistry) and answered with a
//! [`Reply`](reply::Reply).

pub mod dispatcher;
pub mod parse;
pub mod registry;
pub mod reply;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::Result;
use crate::guard::{ConfirmationGate, CooldownLimiter};
use crate::ledger::{build_ledger, Ledger};
use crate::link::{AccountLinks, FileAccountLinks, LinkCallback, LinkGuard, MemoryAccountLinks, TokenStore};
use crate::otp::email::build_sender;
use crate::otp::{EmailSender, OtpService};
use crate::store::{MemoryStore, Sweep, TtlStore};
use crate::transfer::{TransferOrchestrator, TransferRequest, TransferSettings};

pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use reply::{ConsoleReplyChannel, LinkButton, Reply, ReplyChannel};

/// Fully wired bot: command dispatcher plus the web link callback
pub struct Bot {
    pub dispatcher: Dispatcher,
    pub callback: LinkCallback,
    sweepers: Vec<(&'static str, Arc<dyn Sweep>)>,
}

impl Bot {
    /// Build every collaborator from configuration
    pub fn from_config(config: &Config, clock: SharedClock) -> Result<Self> {
        let links: Arc<dyn AccountLinks> = match &config.link.store_path {
            Some(path) => Arc::new(FileAccountLinks::load(path)?),
            None => Arc::new(MemoryAccountLinks::new()),
        };
        let ledger = build_ledger(&config.ledger)?;
        let email: Arc<dyn EmailSender> = Arc::from(build_sender(&config.email)?);
        Self::assemble(config, clock, links, ledger, email)
    }

    /// Wire the bot around the given external collaborators
    pub fn assemble(
        config: &Config,
        clock: SharedClock,
        links: Arc<dyn AccountLinks>,
        ledger: Arc<dyn Ledger>,
        email: Arc<dyn EmailSender>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenStore::in_memory(
            clock.clone(),
            chrono::Duration::seconds(config.link.token_ttl_secs as i64),
        ));
        let guard = Arc::new(LinkGuard::new(links.clone(), tokens.clone(), &config.link.base_url)?);
        let otp = Arc::new(OtpService::in_memory(email, clock.clone(), config.otp.clone()));
        let cooldown = Arc::new(CooldownLimiter::in_memory(clock.clone(), config.cooldown.policy));

        let pending: Arc<dyn TtlStore<TransferRequest>> = Arc::new(MemoryStore::new(clock));
        let gate = Arc::new(ConfirmationGate::new(
            pending,
            chrono::Duration::seconds(config.confirm.pending_ttl_secs as i64),
        ));

        let ledger_timeout = Duration::from_millis(config.ledger.timeout_ms);
        let orchestrator = Arc::new(TransferOrchestrator::new(
            guard.clone(),
            otp.clone(),
            cooldown.clone(),
            ledger.clone(),
            TransferSettings {
                cooldown_window_ms: config.cooldown.window_ms,
                ledger_timeout,
            },
        ));

        let mut sweepers = vec![
            ("link_tokens", tokens.sweeper()),
            ("cooldowns", cooldown.sweeper()),
            ("confirmations", gate.sweeper()),
        ];
        sweepers.extend(otp.sweepers());

        let dispatcher = Dispatcher::new(
            guard,
            otp,
            gate,
            orchestrator,
            ledger,
            DispatcherSettings {
                confirm_above: config.confirm.threshold()?,
                ledger_timeout,
            },
        );
        let callback = LinkCallback::new(tokens, links);

        info!(
            commands = dispatcher.registry().commands().count(),
            "Bot assembled"
        );
        Ok(Self {
            dispatcher,
            callback,
            sweepers,
        })
    }

    /// Stores to hand to [`crate::store::spawn_sweeper`]
    pub fn sweepers(&self) -> Vec<(&'static str, Arc<dyn Sweep>)> {
        self.sweepers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{Amount, MemoryLedger};
    use crate::otp::email::MemoryEmailSender;
    use crate::types::{AccountId, ActorId};

    fn bot() -> (Bot, Arc<MemoryLedger>) {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let ledger = Arc::new(MemoryLedger::new());
        let bot = Bot::assemble(
            &Config::default(),
            clock,
            Arc::new(MemoryAccountLinks::new()),
            ledger.clone(),
            Arc::new(MemoryEmailSender::new()),
        )
        .unwrap();
        (bot, ledger)
    }

    #[tokio::test]
    async fn test_link_then_balance() {
        let (bot, ledger) = bot();
        let alice = ActorId::new("alice");
        ledger.set_balance(&AccountId::new("GALICE"), Amount::units(42).unwrap());

        let prompt = bot.dispatcher.handle(&alice, "!connect").await.unwrap();
        let url = prompt.button.unwrap().url;
        let token = url.split("token=").nth(1).unwrap();

        let linked = bot.callback.complete(token, &AccountId::new("GALICE")).await.unwrap();
        assert_eq!(linked, alice);

        let reply = bot.dispatcher.handle(&alice, "!balance").await.unwrap();
        assert_eq!(reply.content, "💰 Balance: 42 XLM");
    }

    #[test]
    fn test_sweepers_registered() {
        let (bot, _) = bot();
        let names: Vec<_> = bot.sweepers().into_iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"link_tokens"));
        assert!(names.contains(&"email_challenges"));
        assert!(names.contains(&"confirmations"));
    }
}
