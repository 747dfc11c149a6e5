//! Transfer orchestration
//!
//! Runs every check in a fixed order before anything reaches the ledger. The
//! first failing check decides the outcome and nothing after it runs:
//!
//! ```text
//! link → self/amount → OTP setup → email challenge → code present → code valid
//!      → recipient linked → cooldown → balance → execute
//! ```
//!
//! Nothing is retried. A ledger error or timeout while executing is reported
//! as [`TransferOutcome::ExecutionFailed`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::guard::CooldownLimiter;
use crate::ledger::{Amount, Ledger, TransferReceipt};
use crate::link::{LinkGuard, LinkPrompt, LinkStatus};
use crate::otp::{OtpService, TotpSetup};
use crate::types::{AccountId, ActorId};

/// A transfer as submitted by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: ActorId,
    pub recipient: ActorId,
    pub amount: Amount,
    /// TOTP or emailed code
    pub code: Option<String>,
    /// Address for an email challenge when no authenticator is enrolled
    pub email: Option<String>,
}

impl TransferRequest {
    pub fn new(sender: ActorId, recipient: ActorId, amount: Amount) -> Self {
        Self {
            sender,
            recipient,
            amount,
            code: None,
            email: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Outcome for a request that can never succeed, whatever the actor's state
    pub fn rejection(&self) -> Option<TransferOutcome> {
        if self.recipient == self.sender {
            Some(TransferOutcome::SelfTransferRejected)
        } else if !self.amount.is_positive() {
            Some(TransferOutcome::InvalidAmount)
        } else {
            None
        }
    }
}

/// Terminal result of one transfer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    LinkRequired(LinkPrompt),
    SelfTransferRejected,
    InvalidAmount,
    OtpSetupRequired(TotpSetup),
    EmailChallengeSent { address: String },
    InvalidEmail { address: String },
    CodeRequired,
    CodeInvalid,
    RecipientNotLinked,
    RateLimited { retry_after: Option<Duration> },
    InsufficientFunds { balance: Amount },
    Success {
        reference: String,
        amount: Amount,
        recipient: ActorId,
    },
    ExecutionFailed { reason: String },
}

impl TransferOutcome {
    /// Stable state name for logs
    pub fn state(&self) -> &'static str {
        match self {
            TransferOutcome::LinkRequired(_) => "LINK_REQUIRED",
            TransferOutcome::SelfTransferRejected => "SELF_TRANSFER_REJECTED",
            TransferOutcome::InvalidAmount => "INVALID_AMOUNT",
            TransferOutcome::OtpSetupRequired(_) => "OTP_SETUP_REQUIRED",
            TransferOutcome::EmailChallengeSent { .. } => "EMAIL_CHALLENGE_SENT",
            TransferOutcome::InvalidEmail { .. } => "INVALID_EMAIL",
            TransferOutcome::CodeRequired => "CODE_REQUIRED",
            TransferOutcome::CodeInvalid => "CODE_INVALID",
            TransferOutcome::RecipientNotLinked => "RECIPIENT_NOT_LINKED",
            TransferOutcome::RateLimited { .. } => "RATE_LIMITED",
            TransferOutcome::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferOutcome::Success { .. } => "SUCCESS",
            TransferOutcome::ExecutionFailed { .. } => "EXECUTION_FAILED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    /// The one user-facing message for this outcome
    pub fn message(&self) -> String {
        match self {
            TransferOutcome::LinkRequired(_) => {
                "🔗 You need to connect your Stellar account first. Use the link below (expires in 1 hour).".to_string()
            }
            TransferOutcome::SelfTransferRejected => "🚫 You can't send XLM to yourself!".to_string(),
            TransferOutcome::InvalidAmount => "❌ The amount must be greater than zero.".to_string(),
            TransferOutcome::OtpSetupRequired(setup) => format!(
                "🔐 Set up your authenticator: add this secret (or scan the QR for the URI below), then re-run your transfer with `code=`.\nSecret (base32): `{}`\n{}",
                setup.secret, setup.provisioning_uri
            ),
            TransferOutcome::EmailChallengeSent { address } => format!(
                "✉️ Sent a one-time code to **{}**. Re-run your transfer with `code=<code>` (without `email=`).",
                address
            ),
            TransferOutcome::InvalidEmail { address } => {
                format!("❌ `{}` is not a valid email address.", address)
            }
            TransferOutcome::CodeRequired => {
                "❗ Please provide your `code:` from your Authenticator app or email to proceed.".to_string()
            }
            TransferOutcome::CodeInvalid => "❌ Invalid or expired code.".to_string(),
            TransferOutcome::RecipientNotLinked => {
                "❌ The recipient has not connected a Stellar account yet.".to_string()
            }
            TransferOutcome::RateLimited { .. } => {
                "⏳ You're sending commands too fast. Please wait a moment.".to_string()
            }
            TransferOutcome::InsufficientFunds { balance } => {
                format!("❌ Insufficient funds (your balance: {} XLM).", balance)
            }
            TransferOutcome::Success {
                amount, recipient, ..
            } => format!("✅ Successfully sent {} XLM to {}!", amount, recipient),
            TransferOutcome::ExecutionFailed { .. } => {
                "❌ Transfer failed—please try again later.".to_string()
            }
        }
    }

    pub fn link_prompt(&self) -> Option<&LinkPrompt> {
        match self {
            TransferOutcome::LinkRequired(prompt) => Some(prompt),
            _ => None,
        }
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub cooldown_window_ms: u64,
    /// Bound on each ledger call
    pub ledger_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            cooldown_window_ms: 10_000,
            ledger_timeout: Duration::from_secs(30),
        }
    }
}

pub struct TransferOrchestrator {
    guard: Arc<LinkGuard>,
    otp: Arc<OtpService>,
    cooldown: Arc<CooldownLimiter>,
    ledger: Arc<dyn Ledger>,
    settings: TransferSettings,
}

impl TransferOrchestrator {
    pub fn new(
        guard: Arc<LinkGuard>,
        otp: Arc<OtpService>,
        cooldown: Arc<CooldownLimiter>,
        ledger: Arc<dyn Ledger>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            guard,
            otp,
            cooldown,
            ledger,
            settings,
        }
    }

    /// Run one transfer request to its terminal outcome.
    ///
    /// Infrastructure errors never escape; they are logged and reported as
    /// [`TransferOutcome::ExecutionFailed`].
    pub async fn execute(&self, request: &TransferRequest) -> TransferOutcome {
        let outcome = match self.run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(actor = %request.sender, error = %e, "Transfer aborted by infrastructure error");
                TransferOutcome::ExecutionFailed {
                    reason: e.to_string(),
                }
            }
        };
        debug!(actor = %request.sender, state = outcome.state(), "Transfer finished");
        outcome
    }

    async fn run(&self, request: &TransferRequest) -> crate::error::Result<TransferOutcome> {
        let sender = &request.sender;

        // 1. Sender must be linked
        let sender_account = match self.guard.require_link(sender).await? {
            LinkStatus::Linked(account) => account,
            LinkStatus::Unlinked(prompt) => return Ok(TransferOutcome::LinkRequired(prompt)),
        };

        // 2. Request shape, before any OTP state is touched
        if let Some(rejected) = request.rejection() {
            warn!(actor = %sender, amount = %request.amount, state = rejected.state(), "Rejected transfer request");
            return Ok(rejected);
        }

        let code = non_empty(request.code.as_deref());
        let email = non_empty(request.email.as_deref());
        let enrolled = self.otp.has_secret(sender);

        // 3. First transfer without any factor: enroll an authenticator
        if !enrolled && code.is_none() && email.is_none() {
            let setup = self.otp.generate_totp_secret(sender)?;
            info!(actor = %sender, "OTP setup required");
            return Ok(TransferOutcome::OtpSetupRequired(setup));
        }

        // 4. Email fallback for actors without an authenticator
        if let (false, Some(address)) = (enrolled, email) {
            return match self.otp.issue_email_challenge(sender, address).await {
                Ok(_) => Ok(TransferOutcome::EmailChallengeSent {
                    address: address.to_string(),
                }),
                Err(Error::InvalidEmail(address)) => Ok(TransferOutcome::InvalidEmail { address }),
                Err(e) => Err(e),
            };
        }

        // 5. A code is needed from here on
        let Some(code) = code else {
            debug!(actor = %sender, "Code required");
            return Ok(TransferOutcome::CodeRequired);
        };

        // 6. TOTP first, emailed code as fallback
        if !self.otp.verify_totp(sender, code) && !self.otp.verify_email_challenge(sender, code) {
            warn!(actor = %sender, "Rejected invalid or expired code");
            return Ok(TransferOutcome::CodeInvalid);
        }

        let Some(recipient_account) = self.guard.linked_account(&request.recipient).await? else {
            warn!(actor = %sender, recipient = %request.recipient, "Recipient not linked");
            return Ok(TransferOutcome::RecipientNotLinked);
        };

        // 7. Cooldown
        if !self.cooldown.check(sender, self.settings.cooldown_window_ms) {
            warn!(actor = %sender, "Transfer rate limited");
            return Ok(TransferOutcome::RateLimited {
                retry_after: self.cooldown.remaining(sender, self.settings.cooldown_window_ms),
            });
        }

        // 8. Fresh balance on every attempt
        let balance = match self.timed(self.ledger.balance(&sender_account)).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(actor = %sender, error = %e, "Balance query failed");
                return Ok(TransferOutcome::ExecutionFailed {
                    reason: e.to_string(),
                });
            }
        };
        if request.amount > balance {
            warn!(actor = %sender, amount = %request.amount, balance = %balance, "Insufficient funds");
            return Ok(TransferOutcome::InsufficientFunds { balance });
        }

        // 9. Execute
        info!(
            actor = %sender,
            recipient = %request.recipient,
            amount = %request.amount,
            "Executing transfer"
        );
        Ok(self
            .execute_transfer(&sender_account, &recipient_account, request)
            .await)
    }

    async fn execute_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        request: &TransferRequest,
    ) -> TransferOutcome {
        match self.timed(self.ledger.transfer(from, to, request.amount)).await {
            Ok(TransferReceipt { reference }) => {
                info!(
                    actor = %request.sender,
                    recipient = %request.recipient,
                    amount = %request.amount,
                    reference = %reference,
                    "Transfer succeeded"
                );
                TransferOutcome::Success {
                    reference,
                    amount: request.amount,
                    recipient: request.recipient.clone(),
                }
            }
            Err(e) => {
                error!(
                    actor = %request.sender,
                    recipient = %request.recipient,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Transfer failed"
                );
                TransferOutcome::ExecutionFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Apply the ledger timeout to a call
    async fn timed<T>(
        &self,
        call: impl std::future::Future<Output = crate::error::Result<T>>,
    ) -> crate::error::Result<T> {
        let limit = self.settings.ledger_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::LedgerTimeout(limit.as_millis() as u64)),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
