//! One-time transfer codes
//!
//! Two factors are accepted before a transfer: a TOTP code from an
//! authenticator app enrolled with [`OtpService::generate_totp_secret`], or a
//! six-digit code mailed by [`OtpService::issue_email_challenge`] for actors
//! who have not enrolled yet.

pub mod base32;
pub mod email;
pub mod totp;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::store::{sweep_handle, MemoryStore, Sweep, TtlStore};
use crate::types::ActorId;

pub use email::{EmailConfig, EmailMode, EmailSender};
pub use totp::TotpParams;

/// OTP configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Issuer shown by authenticator apps
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Label prefix, rendered as `<prefix>:<actor>`
    #[serde(default = "default_account_prefix")]
    pub account_prefix: String,
    /// Secret length in bytes
    #[serde(default = "default_secret_len")]
    pub secret_len: usize,
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,
    #[serde(default = "default_skew_steps")]
    pub skew_steps: u64,
    #[serde(default = "default_digits")]
    pub digits: u32,
    /// Lifetime of a mailed code
    #[serde(default = "default_email_code_ttl_secs")]
    pub email_code_ttl_secs: u64,
}

fn default_issuer() -> String {
    "StellicaBot".to_string()
}

fn default_account_prefix() -> String {
    "Stellica".to_string()
}

fn default_secret_len() -> usize {
    20
}

fn default_step_secs() -> u64 {
    30
}

fn default_skew_steps() -> u64 {
    1
}

fn default_digits() -> u32 {
    6
}

fn default_email_code_ttl_secs() -> u64 {
    600
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            account_prefix: default_account_prefix(),
            secret_len: default_secret_len(),
            step_secs: default_step_secs(),
            skew_steps: default_skew_steps(),
            digits: default_digits(),
            email_code_ttl_secs: default_email_code_ttl_secs(),
        }
    }
}

impl OtpConfig {
    pub fn params(&self) -> TotpParams {
        TotpParams {
            digits: self.digits,
            step_secs: self.step_secs,
            skew_steps: self.skew_steps,
        }
    }
}

/// Enrolled TOTP secret
#[derive(Debug, Clone)]
pub struct OtpSecret {
    pub key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Enrollment material for the actor's authenticator app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpSetup {
    /// Base32 secret for manual entry
    pub secret: String,
    /// `otpauth://` URI for QR rendering
    pub provisioning_uri: String,
}

/// Outstanding mailed code
#[derive(Debug, Clone)]
pub struct EmailChallenge {
    pub code: String,
    pub address: String,
    pub expires_at: DateTime<Utc>,
}

/// TOTP enrollment and verification plus the email fallback
pub struct OtpService {
    secrets: Arc<dyn TtlStore<OtpSecret>>,
    challenges: Arc<dyn TtlStore<EmailChallenge>>,
    sender: Arc<dyn EmailSender>,
    clock: SharedClock,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(
        secrets: Arc<dyn TtlStore<OtpSecret>>,
        challenges: Arc<dyn TtlStore<EmailChallenge>>,
        sender: Arc<dyn EmailSender>,
        clock: SharedClock,
        config: OtpConfig,
    ) -> Self {
        Self {
            secrets,
            challenges,
            sender,
            clock,
            config,
        }
    }

    /// Service backed by in-memory stores
    pub fn in_memory(sender: Arc<dyn EmailSender>, clock: SharedClock, config: OtpConfig) -> Self {
        let secrets: Arc<dyn TtlStore<OtpSecret>> = Arc::new(MemoryStore::new(clock.clone()));
        let challenges: Arc<dyn TtlStore<EmailChallenge>> =
            Arc::new(MemoryStore::new(clock.clone()));
        Self::new(secrets, challenges, sender, clock, config)
    }

    pub fn has_secret(&self, actor: &ActorId) -> bool {
        self.secrets.contains(actor.as_str())
    }

    /// Create and store a new secret, replacing any previous one
    pub fn generate_totp_secret(&self, actor: &ActorId) -> Result<TotpSetup> {
        let mut key = vec![0u8; self.config.secret_len];
        OsRng.fill_bytes(&mut key);
        let secret = base32::encode(&key);

        let label = format!("{}:{}", self.config.account_prefix, actor);
        let provisioning_uri =
            totp::provisioning_uri(&secret, &label, &self.config.issuer, &self.config.params())?;

        let replaced = self
            .secrets
            .swap(
                actor.as_str(),
                OtpSecret {
                    key,
                    created_at: self.clock.now(),
                },
                None,
            )
            .is_some();
        info!(actor = %actor, replaced, "Generated TOTP secret");

        Ok(TotpSetup {
            secret,
            provisioning_uri,
        })
    }

    /// Check a TOTP code against the stored secret; never consumes it
    pub fn verify_totp(&self, actor: &ActorId, code: &str) -> bool {
        let Some(secret) = self.secrets.get(actor.as_str()) else {
            debug!(actor = %actor, "No TOTP secret enrolled");
            return false;
        };
        let now = self.clock.now().timestamp();
        totp::verify(&secret.key, code, now, &self.config.params())
    }

    /// Issue a six-digit code and mail it to `address`.
    ///
    /// Replaces any outstanding code for the actor. Delivery failures are
    /// logged and do not fail the challenge.
    pub async fn issue_email_challenge(&self, actor: &ActorId, address: &str) -> Result<String> {
        let address = address.trim();
        if !email::is_valid_address(address) {
            return Err(Error::InvalidEmail(address.to_string()));
        }

        let code = OsRng.gen_range(100_000..1_000_000u32).to_string();
        let ttl = Duration::seconds(self.config.email_code_ttl_secs as i64);
        self.challenges.set(
            actor.as_str(),
            EmailChallenge {
                code: code.clone(),
                address: address.to_string(),
                expires_at: self.clock.now() + ttl,
            },
            Some(ttl),
        );

        match self
            .sender
            .send_email(address, email::CODE_SUBJECT, &email::code_body(&code))
            .await
        {
            Ok(()) => info!(actor = %actor, "Email challenge issued"),
            Err(e) => warn!(actor = %actor, error = %e, "Email challenge delivery failed"),
        }
        Ok(code)
    }

    /// True once for the outstanding code; the code is deleted on success
    pub fn verify_email_challenge(&self, actor: &ActorId, code: &str) -> bool {
        let code = code.trim();
        let verified = self
            .challenges
            .take_if(actor.as_str(), &|challenge| {
                challenge.code.len() == code.len()
                    && bool::from(challenge.code.as_bytes().ct_eq(code.as_bytes()))
            })
            .is_some();
        debug!(actor = %actor, verified, "Email challenge checked");
        verified
    }

    /// Sweep handles for the background sweeper
    pub fn sweepers(&self) -> Vec<(&'static str, Arc<dyn Sweep>)> {
        vec![("email_challenges", sweep_handle(self.challenges.clone()))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::otp::email::MemoryEmailSender;

    const RFC_KEY: &[u8] = b"12345678901234567890";

    fn service() -> (OtpService, Arc<MemoryEmailSender>, ManualClock) {
        service_at(1_700_000_000)
    }

    fn service_at(unix_secs: i64) -> (OtpService, Arc<MemoryEmailSender>, ManualClock) {
        let clock = ManualClock::at_unix(unix_secs);
        let sender = Arc::new(MemoryEmailSender::new());
        let service = OtpService::in_memory(sender.clone(), Arc::new(clock.clone()), OtpConfig::default());
        (service, sender, clock)
    }

    /// Enroll the RFC 4226 test key so codes per step are known
    fn enroll_rfc_key(service: &OtpService, actor: &ActorId) {
        service.secrets.set(
            actor.as_str(),
            OtpSecret {
                key: RFC_KEY.to_vec(),
                created_at: service.clock.now(),
            },
            None,
        );
    }

    fn current_code(service: &OtpService, setup: &TotpSetup, clock: &ManualClock, offset_secs: i64) -> String {
        let key = base32::decode(&setup.secret).unwrap();
        totp::code_at(&key, clock.now().timestamp() + offset_secs, &service.config.params()).unwrap()
    }

    #[test]
    fn test_generate_secret_and_verify() {
        let (service, _, clock) = service();
        let actor = ActorId::new("alice");
        assert!(!service.has_secret(&actor));

        let setup = service.generate_totp_secret(&actor).unwrap();
        assert!(service.has_secret(&actor));
        assert_eq!(setup.secret.len(), 32);
        assert!(setup.provisioning_uri.starts_with("otpauth://totp/Stellica:alice?"));

        let code = current_code(&service, &setup, &clock, 0);
        assert!(service.verify_totp(&actor, &code));
        // Not consumed
        assert!(service.verify_totp(&actor, &code));
    }

    #[test]
    fn test_totp_window() {
        // t=59 is HOTP counter 1; the window spans counters 0..=2
        let (service, _, clock) = service_at(59);
        let actor = ActorId::new("alice");
        enroll_rfc_key(&service, &actor);

        assert!(service.verify_totp(&actor, "755224"));
        assert!(service.verify_totp(&actor, "287082"));
        assert!(service.verify_totp(&actor, "359152"));
        assert!(!service.verify_totp(&actor, "969429"));

        // t=179 is counter 5; counter 1 has left the window
        clock.advance(Duration::seconds(120));
        assert!(!service.verify_totp(&actor, "287082"));
        assert!(service.verify_totp(&actor, "254676"));
    }

    #[test]
    fn test_regenerate_invalidates_old_secret() {
        let (service, _, _) = service_at(59);
        let actor = ActorId::new("alice");
        enroll_rfc_key(&service, &actor);
        assert!(service.verify_totp(&actor, "287082"));

        let setup = service.generate_totp_secret(&actor).unwrap();
        assert_ne!(base32::decode(&setup.secret).unwrap(), RFC_KEY);
        assert_ne!(service.secrets.get(actor.as_str()).unwrap().key, RFC_KEY);
        assert!(!service.verify_totp(&actor, "287082"));
    }

    #[test]
    fn test_verify_without_secret() {
        let (service, _, _) = service();
        assert!(!service.verify_totp(&ActorId::new("nobody"), "123456"));
    }

    #[tokio::test]
    async fn test_email_challenge_single_use() {
        let (service, sender, _) = service();
        let actor = ActorId::new("alice");

        let code = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, email::CODE_SUBJECT);
        assert!(sent[0].body.contains(&code));

        assert!(service.verify_email_challenge(&actor, &code));
        assert!(!service.verify_email_challenge(&actor, &code));
    }

    #[tokio::test]
    async fn test_wrong_email_code_keeps_challenge() {
        let (service, _, _) = service();
        let actor = ActorId::new("alice");
        let code = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();

        let wrong = if code == "999999" { "100000" } else { "999999" };
        assert!(!service.verify_email_challenge(&actor, wrong));
        assert!(service.verify_email_challenge(&actor, &code));
    }

    #[tokio::test]
    async fn test_email_challenge_expires() {
        let (service, _, clock) = service();
        let actor = ActorId::new("alice");
        let code = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();

        clock.advance(Duration::minutes(11));
        assert!(!service.verify_email_challenge(&actor, &code));
    }

    #[tokio::test]
    async fn test_new_challenge_overwrites_previous() {
        let (service, _, _) = service();
        let actor = ActorId::new("alice");
        let first = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();
        let second = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();

        if first != second {
            assert!(!service.verify_email_challenge(&actor, &first));
        }
        assert!(service.verify_email_challenge(&actor, &second));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_issues_code() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let service = OtpService::in_memory(
            Arc::new(MemoryEmailSender::failing()),
            Arc::new(clock),
            OtpConfig::default(),
        );
        let actor = ActorId::new("alice");
        let code = service.issue_email_challenge(&actor, "alice@example.com").await.unwrap();
        assert!(service.verify_email_challenge(&actor, &code));
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let (service, sender, _) = service();
        let result = service.issue_email_challenge(&ActorId::new("alice"), "not-an-address").await;
        assert!(matches!(result, Err(Error::InvalidEmail(_))));
        assert!(sender.sent().is_empty());
    }
}
