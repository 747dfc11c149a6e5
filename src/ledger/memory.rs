//! In-process ledger
//!
//! Keeps balances in a map and records every call, so a test can assert which
//! transfers were attempted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::AccountId;

use super::{Amount, Ledger, TransferReceipt};

/// One recorded transfer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCall {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: DashMap<AccountId, Amount>,
    transfers: Mutex<Vec<TransferCall>>,
    balance_queries: AtomicUsize,
    fail_transfers: AtomicBool,
    transfer_delay: Mutex<Option<Duration>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, account: &AccountId, amount: Amount) {
        self.balances.insert(account.clone(), amount);
    }

    /// Make every following transfer fail
    pub fn fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    /// Delay transfers, for exercising caller timeouts
    pub fn delay_transfers(&self, delay: Duration) {
        *self.transfer_delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// Every transfer call received, including failed ones
    pub fn transfer_calls(&self) -> Vec<TransferCall> {
        self.transfers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).map(|b| *b).unwrap_or(Amount::ZERO)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn balance(&self, account: &AccountId) -> Result<Amount> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance_of(account))
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        self.transfers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TransferCall {
                from: from.clone(),
                to: to.clone(),
                amount,
            });

        let delay = *self.transfer_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(Error::LedgerRpc("simulated ledger failure".into()));
        }

        // Debit under the entry lock so concurrent transfers cannot overdraw
        {
            let mut source = self.balances.entry(from.clone()).or_insert(Amount::ZERO);
            if *source < amount {
                return Err(Error::TransferRejected("op_underfunded".into()));
            }
            *source = source.checked_sub(amount)?;
        }
        {
            let mut dest = self.balances.entry(to.clone()).or_insert(Amount::ZERO);
            *dest = dest.checked_add(amount)?;
        }

        let reference = uuid::Uuid::new_v4().simple().to_string();
        info!(from = %from.short(), to = %to.short(), amount = %amount, reference = %reference, "Memory ledger transfer");
        Ok(TransferReceipt { reference })
    }
}
