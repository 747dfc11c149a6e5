//! Stellar Horizon balances plus an HTTP transfer relay
//!
//! Balances come straight from Horizon (`GET /accounts/{id}`). Transfers are
//! posted to a relay service that builds and signs the payment, since this
//! process holds no keys.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::types::AccountId;

use super::{Amount, Ledger, LedgerConfig, TransferReceipt};

const NATIVE_ASSET_CODE: &str = "XLM";

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    balances: Vec<BalanceLine>,
}

#[derive(Debug, Deserialize)]
struct BalanceLine {
    balance: String,
    asset_type: String,
    #[serde(default)]
    asset_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    source: &'a str,
    destination: &'a str,
    amount: String,
    asset: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    hash: Option<String>,
    error: Option<String>,
}

pub struct HorizonLedger {
    client: Client,
    horizon_url: Url,
    relay_url: Url,
    asset_code: String,
}

impl HorizonLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let horizon_url = Url::parse(&config.horizon_url)
            .map_err(|e| Error::Config(format!("Invalid horizon_url {}: {}", config.horizon_url, e)))?;
        if config.relay_url.is_empty() {
            return Err(Error::Config("ledger.relay_url is required in horizon mode".into()));
        }
        let relay_url = Url::parse(&config.relay_url)
            .map_err(|e| Error::Config(format!("Invalid relay_url {}: {}", config.relay_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            horizon_url,
            relay_url,
            asset_code: config.asset_code.clone(),
        })
    }

    fn account_url(&self, account: &AccountId) -> Result<Url> {
        self.horizon_url
            .join(&format!("accounts/{}", account))
            .map_err(|e| Error::Internal(format!("Account URL: {}", e)))
    }

    fn pick_balance(&self, balances: &[BalanceLine]) -> Result<Amount> {
        let line = balances.iter().find(|line| {
            if self.asset_code == NATIVE_ASSET_CODE {
                line.asset_type == "native"
            } else {
                line.asset_code.as_deref() == Some(self.asset_code.as_str())
            }
        });
        match line {
            Some(line) => Amount::parse(&line.balance),
            None => Ok(Amount::ZERO),
        }
    }
}

#[async_trait]
impl Ledger for HorizonLedger {
    async fn balance(&self, account: &AccountId) -> Result<Amount> {
        let url = self.account_url(account)?;
        debug!(account = %account.short(), "Querying Horizon balance");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Unfunded accounts do not exist on the ledger yet
            return Ok(Amount::ZERO);
        }
        if !response.status().is_success() {
            return Err(Error::LedgerRpc(format!("Horizon returned {}", response.status())));
        }

        let body: AccountResponse = response.json().await?;
        self.pick_balance(&body.balances)
    }

    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let request = RelayRequest {
            source: from.as_str(),
            destination: to.as_str(),
            amount: amount.to_string(),
            asset: &self.asset_code,
        };

        let response = self
            .client
            .post(self.relay_url.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body: RelayResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(if status.is_server_error() {
                Error::LedgerRpc(error)
            } else {
                Error::TransferRejected(error)
            });
        }
        if !status.is_success() {
            return Err(Error::LedgerRpc(format!("Relay returned {}", status)));
        }

        let reference = body
            .hash
            .ok_or_else(|| Error::LedgerRpc("No hash in relay response".to_string()))?;
        info!(from = %from.short(), to = %to.short(), amount = %amount, hash = %reference, "Transfer relayed");
        Ok(TransferReceipt { reference })
    }
}
