//! Application-wide error types.

use thiserror::Error;

use crate::keygen::KeygenError;
use crate::wizard::WizardError;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ABI decode error: {0}")]
    Decode(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Key generation error: {0}")]
    Keygen(#[from] KeygenError),

    #[error("{0}")]
    Wizard(#[from] WizardError),

    #[error("No bot wallet has been generated yet")]
    NoBotWallet,

    #[error("Plaintext key export is disabled")]
    PlaintextExportDisabled,

    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ReleaseError>;
