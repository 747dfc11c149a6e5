//! Error types for the link bot
//!
//! These cover infrastructure failures only. Outcomes a user can cause
//! (unlinked account, bad code, cooldown, insufficient funds) are values of
//! [`crate::transfer::TransferOutcome`], not errors.

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the link bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Storage errors
    #[error("Link store error: {0}")]
    LinkStore(String),

    // Ledger errors
    #[error("Ledger RPC error: {0}")]
    LedgerRpc(String),

    #[error("Ledger request timed out after {0}ms")]
    LedgerTimeout(u64),

    #[error("Ledger rejected transfer: {0}")]
    TransferRejected(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflow")]
    AmountOverflow,

    // OTP errors
    #[error("Invalid OTP secret: {0}")]
    InvalidSecret(String),

    #[error("Email delivery failed: {0}")]
    EmailDelivery(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    // Reply channel errors
    #[error("Reply delivery failed: {0}")]
    ReplyDelivery(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is transient.
    ///
    /// Nothing in the transfer path retries automatically; callers use this to
    /// word the failure message ("try again later" vs "this will not work").
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LedgerRpc(_) | Error::LedgerTimeout(_) | Error::EmailDelivery(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::LedgerRpc(format!("request timed out: {}", e))
        } else {
            Error::LedgerRpc(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
