//! Command dispatch
//!
//! Every handler takes an [`Invocation`] and produces one [`Reply`]. Nothing
//! here talks to the chat platform; the caller delivers the reply through a
//! [`ReplyChannel`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::guard::ConfirmationGate;
use crate::ledger::{Amount, Ledger};
use crate::link::{LinkGuard, LinkPrompt, LinkStatus};
use crate::otp::OtpService;
use crate::transfer::{TransferOrchestrator, TransferOutcome, TransferRequest};
use crate::types::ActorId;

use super::parse::{self, Invocation};
use super::registry::{CommandKind, CommandRegistry, CommandSpec};
use super::reply::{Reply, ReplyChannel};

const UNKNOWN_COMMAND: &str = "❌ Unknown command.";
const LINK_REQUIRED: &str = "🔗 You need to connect your Stellar account first. Click below:";
const SERVICE_UNAVAILABLE: &str = "❌ Oops—something went wrong. Please try again later.";

#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    /// Transfers above this amount wait for `!confirm`
    pub confirm_above: Amount,
    /// Bound on balance lookups
    pub ledger_timeout: Duration,
}

pub struct Dispatcher {
    registry: CommandRegistry,
    guard: Arc<LinkGuard>,
    otp: Arc<OtpService>,
    gate: Arc<ConfirmationGate<TransferRequest>>,
    orchestrator: Arc<TransferOrchestrator>,
    ledger: Arc<dyn Ledger>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        guard: Arc<LinkGuard>,
        otp: Arc<OtpService>,
        gate: Arc<ConfirmationGate<TransferRequest>>,
        orchestrator: Arc<TransferOrchestrator>,
        ledger: Arc<dyn Ledger>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry: CommandRegistry::standard(),
            guard,
            otp,
            gate,
            orchestrator,
            ledger,
            settings,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Handle raw message text; `None` when the text is not a command
    pub async fn handle(&self, actor: &ActorId, text: &str) -> Option<Reply> {
        let invocation = parse::parse(actor, text)?;
        Some(self.dispatch(&invocation).await)
    }

    /// Handle raw text and deliver the reply, returning whether one was sent
    pub async fn handle_and_send(
        &self,
        channel: &dyn ReplyChannel,
        actor: &ActorId,
        text: &str,
    ) -> Result<bool> {
        match self.handle(actor, text).await {
            Some(reply) => {
                channel.send(actor, &reply).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn dispatch(&self, inv: &Invocation) -> Reply {
        let Some(spec) = self.registry.lookup(&inv.command) else {
            debug!(actor = %inv.actor, command = %inv.command, "Unknown command");
            return Reply::ephemeral(UNKNOWN_COMMAND);
        };
        debug!(actor = %inv.actor, command = spec.name, "Dispatching command");

        match spec.kind {
            CommandKind::Transfer => self.transfer(inv, spec).await,
            CommandKind::Balance => self.balance(inv).await,
            CommandKind::Connect => self.connect(inv),
            CommandKind::Disconnect => self.disconnect(inv).await,
            CommandKind::Otp => self.otp_command(inv, spec),
            CommandKind::Confirm => self.confirm(inv).await,
            CommandKind::Help => Reply::ephemeral(self.registry.help_text()),
        }
    }

    async fn transfer(&self, inv: &Invocation, spec: &CommandSpec) -> Reply {
        let (Some(recipient), Some(amount)) = (inv.arg(0), inv.arg(1)) else {
            return usage(spec);
        };
        let Some(recipient) = parse::mention(recipient) else {
            return Reply::ephemeral(format!(
                "❌ `{}` is not a user mention.\nUsage: `{}`",
                recipient, spec.usage
            ));
        };
        let amount = match Amount::parse(amount) {
            Ok(amount) => amount,
            Err(_) => return Reply::ephemeral(format!("❌ `{}` is not a valid amount.", amount)),
        };

        let request = TransferRequest {
            sender: inv.actor.clone(),
            recipient,
            amount,
            code: inv.option("code").map(String::from),
            email: inv.option("email").map(String::from),
        };

        if amount > self.settings.confirm_above {
            match self.guard.require_link(&inv.actor).await {
                Ok(LinkStatus::Linked(_)) => {}
                Ok(LinkStatus::Unlinked(prompt)) => return link_reply(&prompt),
                Err(e) => {
                    error!(actor = %inv.actor, error = %e, "Link check failed");
                    return Reply::ephemeral(SERVICE_UNAVAILABLE);
                }
            }
            // Never queue a request the orchestrator would refuse outright
            if let Some(rejected) = request.rejection() {
                return outcome_reply(&rejected);
            }
            info!(actor = %inv.actor, amount = %amount, "Transfer held for confirmation");
            self.gate.request_confirmation(&inv.actor, request);
            return Reply::ephemeral(format!(
                "❗ This is a sensitive operation ({} XLM). Please confirm by typing `!confirm`.",
                amount
            ));
        }

        self.run_transfer(&request).await
    }

    async fn confirm(&self, inv: &Invocation) -> Reply {
        let Some(mut request) = self.gate.take_confirmed(&inv.actor) else {
            return Reply::ephemeral("❌ You have nothing pending to confirm.");
        };
        // A TOTP code typed with the original request may have rolled over
        if let Some(code) = inv.option("code") {
            request.code = Some(code.to_string());
        }
        info!(actor = %inv.actor, amount = %request.amount, "Pending transfer confirmed");
        self.run_transfer(&request).await
    }

    async fn run_transfer(&self, request: &TransferRequest) -> Reply {
        let outcome = self.orchestrator.execute(request).await;
        outcome_reply(&outcome)
    }

    async fn balance(&self, inv: &Invocation) -> Reply {
        let account = match self.guard.require_link(&inv.actor).await {
            Ok(LinkStatus::Linked(account)) => account,
            Ok(LinkStatus::Unlinked(prompt)) => return link_reply(&prompt),
            Err(e) => {
                error!(actor = %inv.actor, error = %e, "Link check failed");
                return Reply::ephemeral(SERVICE_UNAVAILABLE);
            }
        };

        match tokio::time::timeout(self.settings.ledger_timeout, self.ledger.balance(&account)).await {
            Ok(Ok(balance)) => Reply::ephemeral(format!("💰 Balance: {} XLM", balance)),
            Ok(Err(e)) => {
                error!(actor = %inv.actor, error = %e, "Balance query failed");
                Reply::ephemeral("❌ Could not fetch your balance—please try again later.")
            }
            Err(_) => {
                error!(actor = %inv.actor, "Balance query timed out");
                Reply::ephemeral("❌ Could not fetch your balance—please try again later.")
            }
        }
    }

    fn connect(&self, inv: &Invocation) -> Reply {
        let prompt = self.guard.prompt(&inv.actor);
        info!(actor = %inv.actor, "Issued connect link");
        Reply::link_prompt(
            "🔗 Click the button below to securely link your chat account to Stellar. This link will expire in 1 hour.",
            &prompt,
        )
    }

    async fn disconnect(&self, inv: &Invocation) -> Reply {
        match self.guard.links().unlink(&inv.actor).await {
            Ok(true) => {
                info!(actor = %inv.actor, "Account unlinked");
                Reply::ephemeral("✅ Your Stellar account has been disconnected.")
            }
            Ok(false) => Reply::ephemeral("ℹ️ No Stellar account is connected."),
            Err(e) => {
                error!(actor = %inv.actor, error = %e, "Unlink failed");
                Reply::ephemeral(SERVICE_UNAVAILABLE)
            }
        }
    }

    fn otp_command(&self, inv: &Invocation, spec: &CommandSpec) -> Reply {
        match inv.arg(0) {
            Some("generate") => match self.otp.generate_totp_secret(&inv.actor) {
                Ok(setup) => Reply::ephemeral(format!(
                    "🔐 **TOTP Secret Generated**\n• Secret (base32): `{}`\n• URI: {}\n\nUse `!otp verify <code>` to test validation.",
                    setup.secret, setup.provisioning_uri
                )),
                Err(e) => {
                    error!(actor = %inv.actor, error = %e, "TOTP enrollment failed");
                    Reply::ephemeral(SERVICE_UNAVAILABLE)
                }
            },
            Some("verify") => {
                let Some(code) = inv.arg(1).or_else(|| inv.option("code")) else {
                    return usage(spec);
                };
                if !self.otp.has_secret(&inv.actor) {
                    return Reply::ephemeral("❌ You need to run `!otp generate` first!");
                }
                if self.otp.verify_totp(&inv.actor, code) {
                    Reply::ephemeral("✅ Code is valid!")
                } else {
                    Reply::ephemeral("❌ Invalid or expired code.")
                }
            }
            _ => usage(spec),
        }
    }
}

fn usage(spec: &CommandSpec) -> Reply {
    Reply::ephemeral(format!("❗ Usage: `{}`", spec.usage))
}

fn link_reply(prompt: &LinkPrompt) -> Reply {
    Reply::link_prompt(LINK_REQUIRED, prompt)
}

fn outcome_reply(outcome: &TransferOutcome) -> Reply {
    match outcome.link_prompt() {
        Some(prompt) => Reply::link_prompt(outcome.message(), prompt),
        None => Reply::ephemeral(outcome.message()),
    }
}
