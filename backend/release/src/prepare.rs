//! Advisory `prepare-wallet` notification to the platform backend.
//!
//! Best effort only: the release flow never waits on or fails because of it.

use alloy_primitives::Address;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{ReleaseError, Result};

#[derive(Debug, Serialize)]
struct PrepareWalletRequest {
    address: Address,
}

#[derive(Debug, Clone)]
pub struct PrepareClient {
    client: Client,
    base_url: Option<String>,
}

impl PrepareClient {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    pub fn endpoint(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{base}/api/prepare-wallet"))
    }

    /// `POST {base}/api/prepare-wallet`. Returns `Ok(false)` when no endpoint
    /// is configured.
    pub async fn prepare_wallet(&self, address: Address) -> Result<bool> {
        let Some(url) = self.endpoint() else {
            return Ok(false);
        };

        let resp = self
            .client
            .post(&url)
            .json(&PrepareWalletRequest { address })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ReleaseError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("prepare-wallet returned {status}"),
            });
        }
        Ok(true)
    }

    /// Fire the notification and log the outcome. Never fails.
    pub async fn notify(&self, address: Address) {
        match self.prepare_wallet(address).await {
            Ok(true) => info!("Platform notified of bot wallet {address}"),
            Ok(false) => info!("No platform endpoint configured; skipping wallet preparation"),
            Err(e) => warn!("Wallet preparation failed (continuing): {e}"),
        }
    }
}
