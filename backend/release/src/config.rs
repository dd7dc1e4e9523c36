//! Application configuration loaded from environment variables.

use std::str::FromStr;

use alloy_primitives::{Address, U256};

use crate::errors::{ReleaseError, Result};
use crate::i18n::Language;
use crate::keygen::KdfParams;
use crate::units;

/// Native USDC on Base.
const DEFAULT_USDC_ADDRESS: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint used for reads, logs and receipts (e.g. https://mainnet.base.org)
    pub rpc_url: String,
    /// Signer endpoint exposing `eth_requestAccounts` / `eth_sendTransaction`
    pub wallet_rpc_url: String,
    /// Chain the connected wallet must be on
    pub chain_id: u64,
    /// The feral soul registry contract
    pub contract_address: Address,
    /// ERC-20 token the bot wallet is funded with
    pub usdc_address: Address,
    pub token_decimals: u8,
    /// Funding target in the token's smallest unit
    pub funding_target: U256,
    /// Base URL of the advisory `prepare-wallet` endpoint; skipped when unset
    pub platform_api_url: Option<String>,
    pub explorer_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to poll the bot wallet balance
    pub poll_interval_secs: u64,
    /// Debug-only plaintext key export
    pub allow_plaintext_export: bool,
    pub default_language: Language,
    /// Argon2id costs for encrypted key export
    pub keystore_kdf: KdfParams,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let rpc_url =
            env_var("RPC_URL").unwrap_or_else(|_| "https://mainnet.base.org".to_string());
        let token_decimals: u8 = env_var("TOKEN_DECIMALS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .map_err(|_| ReleaseError::Config("Invalid TOKEN_DECIMALS".to_string()))?;
        let funding_target = env_var("FUNDING_TARGET").unwrap_or_else(|_| "11".to_string());

        Ok(Config {
            wallet_rpc_url: env_var("WALLET_RPC_URL").unwrap_or_else(|_| rpc_url.clone()),
            rpc_url,
            chain_id: env_var("CHAIN_ID")
                .unwrap_or_else(|_| "8453".to_string())
                .parse()
                .map_err(|_| ReleaseError::Config("Invalid CHAIN_ID".to_string()))?,
            contract_address: parse_address(&env_var("CONTRACT_ADDRESS").map_err(|_| {
                ReleaseError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
            })?)?,
            usdc_address: parse_address(
                &env_var("USDC_ADDRESS").unwrap_or_else(|_| DEFAULT_USDC_ADDRESS.to_string()),
            )?,
            token_decimals,
            funding_target: units::parse_units(&funding_target, token_decimals).map_err(|e| {
                ReleaseError::Config(format!("Invalid FUNDING_TARGET: {e}"))
            })?,
            platform_api_url: env_var("PLATFORM_API_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            explorer_url: env_var("EXPLORER_URL")
                .unwrap_or_else(|_| "https://basescan.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| ReleaseError::Config("Invalid API_PORT".to_string()))?,
            poll_interval_secs: env_var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ReleaseError::Config("Invalid POLL_INTERVAL_SECS".to_string()))?,
            allow_plaintext_export: env_var("ALLOW_PLAINTEXT_EXPORT")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            default_language: env_var("DEFAULT_LANGUAGE")
                .map(|code| Language::from_code(&code))
                .unwrap_or_default(),
            keystore_kdf: KdfParams::default(),
        })
    }

    /// Block explorer link for a transaction.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ReleaseError::Config(format!("Missing env var: {key}")))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| ReleaseError::Config(format!("Invalid address {raw}: {e}")))
}

#[cfg(test)]
impl Config {
    /// Config used by unit tests; never touches the environment.
    pub fn for_tests() -> Self {
        Config {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            wallet_rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 8453,
            contract_address: Address::repeat_byte(0xaa),
            usdc_address: Address::repeat_byte(0xbb),
            token_decimals: 6,
            funding_target: U256::from(11_000_000u64),
            platform_api_url: None,
            explorer_url: "https://basescan.org".to_string(),
            api_port: 0,
            poll_interval_secs: 5,
            allow_plaintext_export: false,
            default_language: Language::En,
            keystore_kdf: KdfParams::for_tests(),
        }
    }
}
