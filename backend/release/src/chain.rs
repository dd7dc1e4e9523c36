//! Collaborator seams between the wizard session and the outside world.
//!
//! The session only ever talks to these traits; [`crate::rpc::EvmChain`] is
//! the JSON-RPC implementation and the tests swap in in-memory mocks.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::abi::FeralSoul;
use crate::errors::Result;
use crate::wizard::RegistrationIntent;

/// What the wallet reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletStatus {
    /// `None` while no account is connected.
    pub account: Option<Address>,
    pub chain_id: u64,
}

/// Outcome of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    Reverted,
}

/// An ERC-20 `Transfer` log naming the watched address as recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: u64,
    pub tx_hash: Option<B256>,
}

#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Ask the wallet to expose an account; returns the connected account.
    async fn connect(&self) -> Result<Address>;
    async fn status(&self) -> Result<WalletStatus>;
}

#[async_trait]
pub trait RegistryReader: Send + Sync {
    async fn soul_exists(&self, memory_hash: B256) -> Result<bool>;
    /// `None` when no soul is registered under `memory_hash`.
    async fn feral_status(&self, memory_hash: B256) -> Result<Option<FeralSoul>>;
}

#[async_trait]
pub trait RegistryWriter: Send + Sync {
    /// Send the registration transaction from `from`. Must not be retried
    /// internally: a retry after an ambiguous failure could register twice.
    async fn submit_registration(&self, from: Address, intent: &RegistrationIntent)
        -> Result<B256>;
    async fn transaction_status(&self, tx_hash: B256) -> Result<TxStatus>;
}

#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn balance_of(&self, owner: Address) -> Result<U256>;
}

#[async_trait]
pub trait TransferWatcher: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;
    /// Transfers to `to` from `from_block` onward. Returns the logs and the
    /// block to resume from on the next call.
    async fn transfers_to(&self, to: Address, from_block: u64) -> Result<(Vec<TransferLog>, u64)>;
}
