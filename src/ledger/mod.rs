//! Ledger collaborator
//!
//! The bot never signs anything itself. It asks the ledger for balances and
//! hands transfers to an execution service that owns the keys.

pub mod amount;
pub mod horizon;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::AccountId;

pub use amount::Amount;
pub use horizon::HorizonLedger;
pub use memory::MemoryLedger;

/// Reference returned for an executed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transaction hash or backend-specific id
    pub reference: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current spendable balance; unfunded accounts report zero
    async fn balance(&self, account: &AccountId) -> Result<Amount>;

    /// Move `amount` from `from` to `to`
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt>;
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    /// In-process ledger for dry runs
    #[default]
    Memory,
    Horizon,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,
    #[serde(default = "default_horizon_url")]
    pub horizon_url: String,
    /// Transfer execution endpoint, required in horizon mode
    #[serde(default)]
    pub relay_url: String,
    /// Upper bound on a single ledger call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_asset_code")]
    pub asset_code: String,
}

fn default_horizon_url() -> String {
    "https://horizon.stellar.org".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_asset_code() -> String {
    "XLM".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::Memory,
            horizon_url: default_horizon_url(),
            relay_url: String::new(),
            timeout_ms: default_timeout_ms(),
            asset_code: default_asset_code(),
        }
    }
}

/// Build the configured ledger backend
pub fn build_ledger(config: &LedgerConfig) -> Result<Arc<dyn Ledger>> {
    match config.mode {
        LedgerMode::Memory => Ok(Arc::new(MemoryLedger::new())),
        LedgerMode::Horizon => Ok(Arc::new(HorizonLedger::new(config)?)),
    }
}
