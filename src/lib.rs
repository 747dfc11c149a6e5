//! Stellar Link Bot Library
//!
//! Links chat identities to Stellar accounts and gates transfers behind
//! one-time codes, a per-actor cooldown and an optional confirmation step.

pub mod bot;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod link;
pub mod otp;
pub mod store;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use transfer::{TransferOrchestrator, TransferOutcome, TransferRequest};
pub use types::{AccountId, ActorId};
