//! Email delivery for one-time transfer codes

use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref EMAIL_ADDRESS: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email address regex");
}

pub const CODE_SUBJECT: &str = "Your Stellica Transfer One-Time Code";

/// Plain-text body of a code email
pub fn code_body(code: &str) -> String {
    format!("Your one-time transfer code is: {}", code)
}

/// Loose syntactic check; the mail server is the real authority
pub fn is_valid_address(address: &str) -> bool {
    EMAIL_ADDRESS.is_match(address.trim())
}

/// Email transport mode
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailMode {
    /// Log the message instead of sending it
    #[default]
    Log,
    Smtp,
}

/// Email transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub mode: EmailMode,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    /// Plaintext SMTP, local development only
    #[serde(default)]
    pub smtp_insecure: bool,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "no-reply@stellica.com".to_string()
}

fn default_from_name() -> String {
    "Stellica Bot".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            mode: EmailMode::Log,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_insecure: false,
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

/// Outbound email transport
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a plain-text email
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Writes emails to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        // Body holds the code and stays out of the log
        info!(to = %to, subject = %subject, "Email delivery disabled, message dropped");
        Ok(())
    }
}

/// SMTP delivery via lettre
pub struct SmtpEmailSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(Error::Config("email.smtp_host is required in smtp mode".into()));
        }

        let transport = if config.smtp_insecure {
            warn!(
                host = %config.smtp_host,
                port = config.smtp_port,
                "Using unencrypted SMTP transport"
            );
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| Error::Config(format!("SMTP relay {}: {}", config.smtp_host, e)))?
                .port(config.smtp_port);

            match (config.smtp_username.is_empty(), config.smtp_password.is_empty()) {
                (true, true) => builder.build(),
                (false, false) => builder
                    .credentials(Credentials::new(
                        config.smtp_username.clone(),
                        config.smtp_password.clone(),
                    ))
                    .build(),
                _ => {
                    return Err(Error::Config(
                        "SMTP username and password must both be set or both be empty".into(),
                    ))
                }
            }
        };

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid from address: {}", e)))?;

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| Error::InvalidEmail(format!("{}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::EmailDelivery(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::EmailDelivery(e.to_string()))?;

        info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Captured message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records messages in memory; can be told to fail
#[derive(Debug, Default)]
pub struct MemoryEmailSender {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl MemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender whose every delivery fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(Error::EmailDelivery("simulated delivery failure".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Build the configured sender
pub fn build_sender(config: &EmailConfig) -> Result<Box<dyn EmailSender>> {
    match config.mode {
        EmailMode::Log => Ok(Box::new(LogEmailSender)),
        EmailMode::Smtp => Ok(Box::new(SmtpEmailSender::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_check() {
        assert!(is_valid_address("alice@example.com"));
        assert!(is_valid_address(" bob@mail.example.org "));
        assert!(!is_valid_address("alice"));
        assert!(!is_valid_address("alice@localhost"));
        assert!(!is_valid_address("a b@example.com"));
    }

    #[test]
    fn test_code_body() {
        assert_eq!(code_body("123456"), "Your one-time transfer code is: 123456");
    }

    #[tokio::test]
    async fn test_memory_sender_records() {
        let sender = MemoryEmailSender::new();
        sender
            .send_email("alice@example.com", CODE_SUBJECT, &code_body("654321"))
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert!(sent[0].body.ends_with("654321"));
    }

    #[tokio::test]
    async fn test_failing_sender() {
        let sender = MemoryEmailSender::failing();
        let err = sender.send_email("alice@example.com", "s", "b").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_smtp_requires_host() {
        let config = EmailConfig {
            mode: EmailMode::Smtp,
            ..EmailConfig::default()
        };
        assert!(matches!(build_sender(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_smtp_rejects_half_credentials() {
        let config = EmailConfig {
            mode: EmailMode::Smtp,
            smtp_host: "smtp.example.com".into(),
            smtp_username: "user".into(),
            ..EmailConfig::default()
        };
        assert!(matches!(SmtpEmailSender::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_email_mode_deserialize() {
        let mode: EmailMode = serde_json::from_str(r#""smtp""#).unwrap();
        assert_eq!(mode, EmailMode::Smtp);
    }
}
