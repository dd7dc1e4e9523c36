//! Soul identifier parsing.
//!
//! An identifier is pasted by the user as `{content_id}::{hash}`. Only the
//! shape is validated here; the hash segment is treated as opaque until it
//! is hashed into the registration key.

use alloy_primitives::{keccak256, B256};
use serde::Serialize;
use thiserror::Error;

pub const DELIMITER: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("expected exactly one `::` delimiter, found {0}")]
    DelimiterCount(usize),
    #[error("content id is empty")]
    EmptyContentId,
    #[error("hash segment is empty")]
    EmptyHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub content_id: String,
    pub hash_hex: String,
}

impl Identifier {
    /// Key the soul is registered under: keccak256 of the hash segment.
    ///
    /// A `0x`-prefixed hex segment is hashed as the bytes it encodes; any
    /// other segment is hashed as UTF-8.
    pub fn registration_hash(&self) -> B256 {
        keccak256(segment_bytes(&self.hash_hex))
    }
}

pub fn parse(raw: &str) -> Result<Identifier, IdentifierError> {
    let parts: Vec<&str> = raw.split(DELIMITER).collect();
    if parts.len() != 2 {
        return Err(IdentifierError::DelimiterCount(parts.len() - 1));
    }

    let content_id = parts[0].trim();
    let hash_hex = parts[1].trim();
    if content_id.is_empty() {
        return Err(IdentifierError::EmptyContentId);
    }
    if hash_hex.is_empty() {
        return Err(IdentifierError::EmptyHash);
    }

    Ok(Identifier {
        content_id: content_id.to_string(),
        hash_hex: hash_hex.to_string(),
    })
}

fn segment_bytes(segment: &str) -> Vec<u8> {
    if let Some(digits) = segment.strip_prefix("0x") {
        if digits.chars().all(|c| c.is_ascii_hexdigit()) {
            // Odd-length hex is left-padded with a zero nibble.
            let padded = if digits.len() % 2 == 1 {
                format!("0{digits}")
            } else {
                digits.to_string()
            };
            if let Ok(bytes) = hex::decode(padded) {
                return bytes;
            }
        }
    }
    segment.as_bytes().to_vec()
}
