//! EVM JSON-RPC client. Reads the registry and the funding token, watches
//! `Transfer` logs, and relays the registration to the owner's wallet.
//!
//! ## Resilience
//!
//! * Read calls apply exponential back-off on transport errors, rate limits
//!   and soft RPC errors, for at most [`MAX_ATTEMPTS`] attempts.
//! * `eth_sendTransaction` is sent exactly once. A transport failure there is
//!   ambiguous and is surfaced to the user instead of being retried.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::abi::{self, FeralSoul};
use crate::chain::{
    RegistryReader, RegistryWriter, TokenReader, TransferLog, TransferWatcher, TxStatus,
    WalletConnector, WalletStatus,
};
use crate::errors::{ReleaseError, Result};
use crate::wizard::RegistrationIntent;

const MAX_BACKOFF_SECS: u64 = 8;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_ATTEMPTS: u32 = 4;

/// Upper bound on the block span of one `eth_getLogs` query.
const MAX_LOG_RANGE: u64 = 2_000;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    status: Option<String>,
}

/// One JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Call `method`, retrying transient failures with back-off.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 1;

        loop {
            match self.call_once(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_ATTEMPTS && is_transient(&e) => {
                    warn!("RPC {method} failed (attempt {attempt}, retry in {backoff}s): {e}");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Call `method` exactly once.
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ReleaseError::Rpc {
                code: 429,
                message: "rate limited".to_string(),
            });
        }

        let body: RpcResponse = resp.json().await?;
        if let Some(err) = body.error {
            return Err(ReleaseError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        debug!("RPC {method} ok");
        Ok(body.result.unwrap_or(Value::Null))
    }

    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let result = self
            .call(
                "eth_call",
                json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        decode_hex_bytes(&result)
    }
}

/// Transport errors, rate limits and server-side errors are worth retrying;
/// invalid requests (-32600), unknown methods (-32601), invalid params
/// (-32602) and execution reverts (3) are not.
fn is_transient(err: &ReleaseError) -> bool {
    match err {
        ReleaseError::Http(_) => true,
        ReleaseError::Rpc { code, .. } => !matches!(code, -32600 | -32601 | -32602 | 3),
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────
// Collaborator implementation
// ─────────────────────────────────────────────────────────

/// The chain as seen by the release flow: a read endpoint plus the owner's
/// signer endpoint.
#[derive(Debug, Clone)]
pub struct EvmChain {
    reads: RpcClient,
    signer: RpcClient,
    contract: Address,
    token: Address,
}

impl EvmChain {
    pub fn new(reads: RpcClient, signer: RpcClient, contract: Address, token: Address) -> Self {
        Self {
            reads,
            signer,
            contract,
            token,
        }
    }
}

#[async_trait]
impl WalletConnector for EvmChain {
    async fn connect(&self) -> Result<Address> {
        let accounts = self.signer.call_once("eth_requestAccounts", json!([])).await?;
        first_account(&accounts)?.ok_or(ReleaseError::NotConnected)
    }

    async fn status(&self) -> Result<WalletStatus> {
        let accounts = self.signer.call("eth_accounts", json!([])).await?;
        let chain_id = self.signer.call("eth_chainId", json!([])).await?;
        Ok(WalletStatus {
            account: first_account(&accounts)?,
            chain_id: parse_quantity(&chain_id)?,
        })
    }
}

#[async_trait]
impl RegistryReader for EvmChain {
    async fn soul_exists(&self, memory_hash: B256) -> Result<bool> {
        let data = self
            .reads
            .eth_call(self.contract, &abi::encode_soul_exists(memory_hash))
            .await?;
        abi::decode_bool(&data)
    }

    async fn feral_status(&self, memory_hash: B256) -> Result<Option<FeralSoul>> {
        let data = self
            .reads
            .eth_call(self.contract, &abi::encode_get_feral_status(memory_hash))
            .await?;
        let soul = abi::decode_feral_soul(&data)?;
        // Unknown hashes come back as a zeroed struct.
        if soul.memory_hash.is_zero() {
            return Ok(None);
        }
        Ok(Some(soul))
    }
}

#[async_trait]
impl RegistryWriter for EvmChain {
    async fn submit_registration(
        &self,
        from: Address,
        intent: &RegistrationIntent,
    ) -> Result<B256> {
        let data = abi::encode_register_feral(
            intent.memory_hash,
            intent.bot_wallet,
            &intent.arweave_id,
            intent.initial_funds,
        );
        let result = self
            .signer
            .call_once(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": self.contract,
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn transaction_status(&self, tx_hash: B256) -> Result<TxStatus> {
        let result = self
            .reads
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(TxStatus::Pending);
        }
        let receipt: RawReceipt = serde_json::from_value(result)?;
        Ok(match receipt.status.as_deref() {
            Some("0x1") => TxStatus::Success,
            Some(_) => TxStatus::Reverted,
            None => TxStatus::Pending,
        })
    }
}

#[async_trait]
impl TokenReader for EvmChain {
    async fn balance_of(&self, owner: Address) -> Result<U256> {
        let data = self
            .reads
            .eth_call(self.token, &abi::encode_balance_of(owner))
            .await?;
        abi::decode_uint(&data)
    }
}

#[async_trait]
impl TransferWatcher for EvmChain {
    async fn latest_block(&self) -> Result<u64> {
        let result = self.reads.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    async fn transfers_to(&self, to: Address, from_block: u64) -> Result<(Vec<TransferLog>, u64)> {
        let latest = self.latest_block().await?;
        if latest < from_block {
            return Ok((vec![], from_block));
        }
        let to_block = latest.min(from_block + MAX_LOG_RANGE - 1);

        let result = self
            .reads
            .call("eth_getLogs", build_log_filter(self.token, to, from_block, to_block))
            .await?;
        let raw: Vec<RawLog> = serde_json::from_value(result)?;

        Ok((decode_transfer_logs(&raw), to_block + 1))
    }
}

fn build_log_filter(token: Address, to: Address, from_block: u64, to_block: u64) -> Value {
    json!([{
        "address": token,
        "fromBlock": format!("0x{from_block:x}"),
        "toBlock": format!("0x{to_block:x}"),
        "topics": [abi::transfer_topic(), Value::Null, abi::address_topic(to)],
    }])
}

// ─────────────────────────────────────────────────────────
// Decoding helpers
// ─────────────────────────────────────────────────────────

/// Decode `Transfer` logs, skipping anything that is not a well-formed
/// three-topic transfer.
pub fn decode_transfer_logs(raw: &[RawLog]) -> Vec<TransferLog> {
    raw.iter().filter_map(decode_transfer_log).collect()
}

fn decode_transfer_log(raw: &RawLog) -> Option<TransferLog> {
    if raw.topics.len() != 3 || raw.topics[0] != abi::transfer_topic() {
        return None;
    }
    let data = hex::decode(raw.data.trim_start_matches("0x")).ok()?;
    Some(TransferLog {
        from: Address::from_word(raw.topics[1]),
        to: Address::from_word(raw.topics[2]),
        amount: abi::decode_uint(&data).ok()?,
        block_number: raw
            .block_number
            .as_deref()
            .and_then(|b| u64::from_str_radix(b.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0),
        tx_hash: raw.transaction_hash,
    })
}

fn decode_hex_bytes(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| ReleaseError::Decode(format!("expected hex string, got {value}")))?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ReleaseError::Decode(format!("invalid hex: {e}")))
}

fn parse_quantity(value: &Value) -> Result<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| ReleaseError::Decode(format!("expected quantity, got {value}")))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ReleaseError::Decode(format!("invalid quantity {s}: {e}")))
}

fn first_account(value: &Value) -> Result<Option<Address>> {
    let accounts: Vec<Address> = serde_json::from_value(value.clone())?;
    Ok(accounts.into_iter().next())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
