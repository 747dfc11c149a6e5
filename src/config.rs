//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ledger::Amount;

// Section configs live next to the code they configure
pub use crate::guard::cooldown::{CooldownConfig, CooldownPolicy, MAX_WINDOW_MS};
pub use crate::ledger::{LedgerConfig, LedgerMode};
pub use crate::otp::email::{EmailConfig, EmailMode};
pub use crate::otp::OtpConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub confirm: ConfirmConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// How often expired tokens, codes and cooldowns are purged
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Account linking
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Web sign-in page receiving `?token=`
    #[serde(default = "default_link_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// JSON registry for durable links; in-memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: default_link_base_url(),
            token_ttl_secs: default_token_ttl_secs(),
            store_path: None,
        }
    }
}

/// Confirmation gate
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmConfig {
    /// Transfers above this many XLM need `!confirm`
    #[serde(default = "default_confirm_above")]
    pub confirm_above: String,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
}

impl ConfirmConfig {
    pub fn threshold(&self) -> crate::error::Result<Amount> {
        Amount::parse(&self.confirm_above)
    }
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            confirm_above: default_confirm_above(),
            pending_ttl_secs: default_pending_ttl_secs(),
        }
    }
}

fn default_link_base_url() -> String {
    "https://stellar-exchange.com/auth/discord".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3600
}

fn default_confirm_above() -> String {
    "100".to_string()
}

fn default_pending_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("link.base_url", default_link_base_url())?
            .set_default("link.token_ttl_secs", default_token_ttl_secs() as i64)?
            .set_default("sweep_interval_secs", default_sweep_interval_secs() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (LINKBOT__SECTION__KEY)
            .add_source(
                config::Environment::with_prefix("LINKBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        require_http_url("link.base_url", &self.link.base_url)?;
        if self.link.token_ttl_secs == 0 {
            anyhow::bail!("link.token_ttl_secs must be positive");
        }

        if !(6..=8).contains(&self.otp.digits) {
            anyhow::bail!("otp.digits must be between 6 and 8, got {}", self.otp.digits);
        }
        if self.otp.skew_steps > crate::otp::totp::MAX_SKEW_STEPS {
            anyhow::bail!(
                "otp.skew_steps must be at most {}, got {}",
                crate::otp::totp::MAX_SKEW_STEPS,
                self.otp.skew_steps
            );
        }
        if self.otp.step_secs == 0 {
            anyhow::bail!("otp.step_secs must be positive");
        }
        if self.otp.secret_len < 10 {
            anyhow::bail!("otp.secret_len must be at least 10 bytes");
        }
        if self.otp.email_code_ttl_secs == 0 {
            anyhow::bail!("otp.email_code_ttl_secs must be positive");
        }

        if self.email.mode == EmailMode::Smtp && self.email.smtp_host.is_empty() {
            anyhow::bail!("email.smtp_host is required when email.mode = smtp");
        }

        if self.cooldown.window_ms == 0 {
            anyhow::bail!("cooldown.window_ms must be positive");
        }
        if self.cooldown.window_ms > MAX_WINDOW_MS {
            anyhow::bail!(
                "cooldown.window_ms must be at most {} (one day), got {}",
                MAX_WINDOW_MS,
                self.cooldown.window_ms
            );
        }

        let threshold = self
            .confirm
            .threshold()
            .with_context(|| format!("Invalid confirm.confirm_above: {}", self.confirm.confirm_above))?;
        if threshold.stroops() < 0 {
            anyhow::bail!("confirm.confirm_above cannot be negative");
        }
        if self.confirm.pending_ttl_secs == 0 {
            anyhow::bail!("confirm.pending_ttl_secs must be positive");
        }

        if self.ledger.timeout_ms == 0 {
            anyhow::bail!("ledger.timeout_ms must be positive");
        }
        if self.ledger.mode == LedgerMode::Horizon {
            require_http_url("ledger.horizon_url", &self.ledger.horizon_url)?;
            require_http_url("ledger.relay_url", &self.ledger.relay_url)?;
        }

        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }

        // Warn about dry-run ledger
        if self.ledger.mode == LedgerMode::Memory {
            tracing::warn!("Ledger mode is 'memory' - transfers are simulated in process");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Link:
    base_url: {}
    token_ttl: {}s
    store_path: {}
  OTP:
    issuer: {}
    account_prefix: {}
    digits: {}
    step: {}s (skew ±{})
    email_code_ttl: {}s
  Email:
    mode: {:?}
    smtp_host: {}
    smtp_port: {}
    smtp_username: {}
    smtp_password: {}
    from: {} <{}>
  Cooldown:
    window: {}ms
    policy: {:?}
  Confirm:
    confirm_above: {} XLM
    pending_ttl: {}s
  Ledger:
    mode: {:?}
    horizon_url: {}
    relay_url: {}
    timeout: {}ms
    asset: {}
  Sweep interval: {}s
"#,
            mask_url(&self.link.base_url),
            self.link.token_ttl_secs,
            self.link
                .store_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(memory)".to_string()),
            self.otp.issuer,
            self.otp.account_prefix,
            self.otp.digits,
            self.otp.step_secs,
            self.otp.skew_steps,
            self.otp.email_code_ttl_secs,
            self.email.mode,
            self.email.smtp_host,
            self.email.smtp_port,
            mask_secret(&self.email.smtp_username),
            mask_secret(&self.email.smtp_password),
            self.email.from_name,
            self.email.from_address,
            self.cooldown.window_ms,
            self.cooldown.policy,
            self.confirm.confirm_above,
            self.confirm.pending_ttl_secs,
            self.ledger.mode,
            mask_url(&self.ledger.horizon_url),
            mask_url(&self.ledger.relay_url),
            self.ledger.timeout_ms,
            self.ledger.asset_code,
            self.sweep_interval_secs,
        )
    }
}

fn require_http_url(key: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("Invalid {}: {:?}", key, value))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must be an http(s) URL, got {}", key, value);
    }
    Ok(())
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

fn mask_secret(value: &str) -> &'static str {
    if value.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            otp: OtpConfig::default(),
            email: EmailConfig::default(),
            cooldown: CooldownConfig::default(),
            confirm: ConfirmConfig::default(),
            ledger: LedgerConfig::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.link.token_ttl_secs, 3600);
        assert_eq!(config.cooldown.window_ms, 10_000);
        assert_eq!(config.cooldown.policy, CooldownPolicy::UpdateOnPass);
        assert_eq!(config.otp.issuer, "StellicaBot");
        assert_eq!(config.ledger.timeout_ms, 30_000);
        assert_eq!(config.confirm.threshold().unwrap(), Amount::units(100).unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[cooldown]
window_ms = 5000
policy = "update_on_attempt"

[confirm]
confirm_above = "250.5"

[otp]
issuer = "TestBot"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.cooldown.window_ms, 5000);
        assert_eq!(config.cooldown.policy, CooldownPolicy::UpdateOnAttempt);
        assert_eq!(config.confirm.threshold().unwrap(), Amount::parse("250.5").unwrap());
        assert_eq!(config.otp.issuer, "TestBot");
        assert_eq!(config.otp.digits, 6);
        assert_eq!(config.link.base_url, "https://stellar-exchange.com/auth/discord");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sweep_interval_secs, 60);
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut config = Config::default();
        config.cooldown.window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_window_and_skew() {
        let mut config = Config::default();
        config.cooldown.window_ms = MAX_WINDOW_MS;
        config.validate().unwrap();
        config.cooldown.window_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.otp.skew_steps = 10;
        config.validate().unwrap();
        config.otp.skew_steps = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_digits() {
        let mut config = Config::default();
        config.otp.digits = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let mut config = Config::default();
        config.link.base_url = "ftp://example.com/auth".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ledger.mode = LedgerMode::Horizon;
        assert!(config.validate().is_err(), "relay_url is empty");
        config.ledger.relay_url = "https://relay.example.com/transfer".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_masked_display_hides_secrets() {
        let mut config = Config::default();
        config.email.smtp_password = "hunter2".into();
        config.ledger.relay_url = "https://relay.example.com/transfer?key=abc".into();
        let shown = config.masked_display();
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("key=abc"));
        assert!(shown.contains("smtp_password: ***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
