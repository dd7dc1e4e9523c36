//! Minimal Solidity ABI encoding for the soul registry and the ERC-20 token.
//!
//! Only the handful of calls the release flow needs are supported:
//!
//! | Contract | Function / Event                                   |
//! |----------|----------------------------------------------------|
//! | Registry | `registerFeral(bytes32,address,string,uint256)`    |
//! | Registry | `soulExists(bytes32) → bool`                       |
//! | Registry | `getFeralStatus(bytes32) → FeralSoul`              |
//! | ERC-20   | `balanceOf(address) → uint256`                     |
//! | ERC-20   | `Transfer(address indexed, address indexed, uint256)` |

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::Serialize;

use crate::errors::{ReleaseError, Result};

const WORD: usize = 32;

pub const REGISTER_FERAL: &str = "registerFeral(bytes32,address,string,uint256)";
pub const SOUL_EXISTS: &str = "soulExists(bytes32)";
pub const GET_FERAL_STATUS: &str = "getFeralStatus(bytes32)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

/// On-chain soul record as returned by `getFeralStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeralSoul {
    pub memory_hash: B256,
    pub bot_wallet: Address,
    pub birth_time: U256,
    pub is_immolated: bool,
    pub arweave_id: String,
    pub initial_funds: U256,
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn transfer_topic() -> B256 {
    keccak256(TRANSFER_EVENT.as_bytes())
}

/// An address left-padded into an indexed topic slot.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

// ─────────────────────────────────────────────────────────
// Call encoding
// ─────────────────────────────────────────────────────────

pub fn encode_soul_exists(memory_hash: B256) -> Vec<u8> {
    let mut out = selector(SOUL_EXISTS).to_vec();
    out.extend_from_slice(memory_hash.as_slice());
    out
}

pub fn encode_get_feral_status(memory_hash: B256) -> Vec<u8> {
    let mut out = selector(GET_FERAL_STATUS).to_vec();
    out.extend_from_slice(memory_hash.as_slice());
    out
}

pub fn encode_balance_of(owner: Address) -> Vec<u8> {
    let mut out = selector(BALANCE_OF).to_vec();
    out.extend_from_slice(owner.into_word().as_slice());
    out
}

pub fn encode_register_feral(
    memory_hash: B256,
    bot_wallet: Address,
    arweave_id: &str,
    initial_funds: U256,
) -> Vec<u8> {
    let mut out = selector(REGISTER_FERAL).to_vec();
    // Head: bytes32, address, offset(string), uint256
    out.extend_from_slice(memory_hash.as_slice());
    out.extend_from_slice(bot_wallet.into_word().as_slice());
    out.extend_from_slice(&U256::from(4 * WORD).to_be_bytes::<32>());
    out.extend_from_slice(&initial_funds.to_be_bytes::<32>());
    // Tail: string length + right-padded bytes
    let bytes = arweave_id.as_bytes();
    out.extend_from_slice(&U256::from(bytes.len()).to_be_bytes::<32>());
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

// ─────────────────────────────────────────────────────────
// Return-data decoding
// ─────────────────────────────────────────────────────────

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    let word = word_at(data, 0)?;
    Ok(word.iter().any(|b| *b != 0))
}

pub fn decode_uint(data: &[u8]) -> Result<U256> {
    Ok(U256::from_be_slice(word_at(data, 0)?))
}

/// Decode the `getFeralStatus` return tuple. The tuple holds a string, so it
/// is dynamic and the data starts with an offset to it.
pub fn decode_feral_soul(data: &[u8]) -> Result<FeralSoul> {
    let base = offset_at(data, 0)?;
    let tuple = data
        .get(base..)
        .ok_or_else(|| ReleaseError::Decode("tuple offset out of range".to_string()))?;

    let memory_hash = B256::from_slice(word_at(tuple, 0)?);
    let bot_wallet = Address::from_slice(&word_at(tuple, 1)?[12..]);
    let birth_time = U256::from_be_slice(word_at(tuple, 2)?);
    let is_immolated = word_at(tuple, 3)?.iter().any(|b| *b != 0);
    let string_offset = offset_at(tuple, 4)?;
    let initial_funds = U256::from_be_slice(word_at(tuple, 5)?);

    let string_data = tuple
        .get(string_offset..)
        .ok_or_else(|| ReleaseError::Decode("string offset out of range".to_string()))?;
    let len = offset_at(string_data, 0)?;
    let raw = string_data
        .get(WORD..WORD + len)
        .ok_or_else(|| ReleaseError::Decode("string length out of range".to_string()))?;
    let arweave_id = String::from_utf8(raw.to_vec())
        .map_err(|e| ReleaseError::Decode(format!("arweave id is not UTF-8: {e}")))?;

    Ok(FeralSoul {
        memory_hash,
        bot_wallet,
        birth_time,
        is_immolated,
        arweave_id,
        initial_funds,
    })
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8]> {
    data.get(index * WORD..(index + 1) * WORD).ok_or_else(|| {
        ReleaseError::Decode(format!(
            "return data too short: need word {index}, have {} bytes",
            data.len()
        ))
    })
}

fn offset_at(data: &[u8], index: usize) -> Result<usize> {
    let value = U256::from_be_slice(word_at(data, index)?);
    if value > U256::from(u32::MAX) {
        return Err(ReleaseError::Decode(format!("offset {value} out of range")));
    }
    Ok(value.as_limbs()[0] as usize)
}
