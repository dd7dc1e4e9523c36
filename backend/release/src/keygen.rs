//! Bot wallet key generation and keystore export.
//!
//! The private key lives in a [`Zeroizing`] buffer, is redacted from `Debug`
//! output, and only leaves the process through [`export_encrypted`] or, when
//! explicitly enabled, [`export_plaintext`].

use std::fmt;

use alloy_primitives::{keccak256, Address};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use chrono::{DateTime, Utc};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

pub const NONCE_SIZE: usize = 12;
pub const SALT_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
const CIPHER_ALGORITHM: &str = "chacha20-poly1305";
const KDF_ALGORITHM: &str = "argon2id";

// Upper bounds accepted when opening a keystore, so a crafted file cannot
// pick its own work factor.
const MAX_M_COST: u32 = 256 * 1024;
const MAX_T_COST: u32 = 10;
const MAX_P_COST: u32 = 4;

#[derive(Debug, Error)]
pub enum KeygenError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid keystore: {0}")]
    InvalidKeystore(String),
    #[error("Key derivation failed: {0}")]
    Kdf(String),
}

#[derive(Clone)]
pub struct GeneratedWallet {
    address: Address,
    private_key: Zeroizing<[u8; 32]>,
}

impl GeneratedWallet {
    pub fn address(&self) -> Address {
        self.address
    }

    fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.private_key.as_ref())))
    }
}

impl fmt::Debug for GeneratedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedWallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Create a fresh secp256k1 key pair.
pub fn generate() -> GeneratedWallet {
    wallet_from_signing_key(&SigningKey::random(&mut OsRng))
}

pub fn from_private_key(bytes: &[u8]) -> Result<GeneratedWallet, KeygenError> {
    let key = SigningKey::from_slice(bytes).map_err(|e| KeygenError::InvalidKey(e.to_string()))?;
    Ok(wallet_from_signing_key(&key))
}

fn wallet_from_signing_key(key: &SigningKey) -> GeneratedWallet {
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    // Uncompressed SEC1 is 0x04 || X || Y; the address hashes X || Y.
    let digest = keccak256(&point.as_bytes()[1..]);
    let address = Address::from_slice(&digest[12..]);

    let mut private_key = Zeroizing::new([0u8; 32]);
    private_key.copy_from_slice(&key.to_bytes());

    GeneratedWallet {
        address,
        private_key,
    }
}

// ─────────────────────────────────────────────────────────
// Export formats
// ─────────────────────────────────────────────────────────

/// Argon2id cost parameters, stored alongside the ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 64 * 1024,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters so tests do not spend seconds in the KDF.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn check_bounds(&self) -> Result<(), KeygenError> {
        if self.m_cost > MAX_M_COST || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(KeygenError::InvalidKeystore(format!(
                "kdf parameters out of range: m={} t={} p={}",
                self.m_cost, self.t_cost, self.p_cost
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// hex
    pub salt: String,
    /// hex
    pub nonce: String,
    /// base64
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keystore {
    pub version: u32,
    pub address: Address,
    pub crypto: KeystoreCrypto,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PlaintextExport {
    pub address: Address,
    pub private_key: Zeroizing<String>,
}

/// A file the user can save: suggested name plus JSON body.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: serde_json::Value,
}

pub fn export_file_name(address: Address, encrypted: bool) -> String {
    let addr = address.to_string();
    let kind = if encrypted { "encrypted" } else { "plain" };
    format!("feral-wallet-{}-{kind}.json", &addr[..6])
}

pub fn derive_encryption_key(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeygenError> {
    let argon_params = ParamsBuilder::new()
        .m_cost(params.m_cost)
        .t_cost(params.t_cost)
        .p_cost(params.p_cost)
        .output_len(KEY_SIZE)
        .build()
        .map_err(|e| KeygenError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| KeygenError::Kdf(e.to_string()))?;
    Ok(key)
}

pub fn export_encrypted(
    wallet: &GeneratedWallet,
    passphrase: &str,
    params: &KdfParams,
) -> Result<Keystore, KeygenError> {
    if passphrase.is_empty() {
        return Err(KeygenError::EmptyPassphrase);
    }

    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = derive_encryption_key(passphrase, &salt, params)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_ref())
        .map_err(|e| KeygenError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), &wallet.private_key[..])
        .map_err(|e| KeygenError::EncryptionFailed(e.to_string()))?;

    Ok(Keystore {
        version: 1,
        address: wallet.address,
        crypto: KeystoreCrypto {
            cipher: CIPHER_ALGORITHM.to_string(),
            kdf: KDF_ALGORITHM.to_string(),
            kdf_params: *params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        },
        created_at: Utc::now(),
    })
}

pub fn decrypt_keystore(keystore: &Keystore, passphrase: &str) -> Result<GeneratedWallet, KeygenError> {
    if keystore.crypto.kdf != KDF_ALGORITHM || keystore.crypto.cipher != CIPHER_ALGORITHM {
        return Err(KeygenError::InvalidKeystore(format!(
            "unsupported scheme {}/{}",
            keystore.crypto.kdf, keystore.crypto.cipher
        )));
    }
    keystore.crypto.kdf_params.check_bounds()?;

    let salt = hex::decode(&keystore.crypto.salt)
        .map_err(|e| KeygenError::InvalidKeystore(format!("salt: {e}")))?;
    let nonce_bytes: [u8; NONCE_SIZE] = hex::decode(&keystore.crypto.nonce)
        .map_err(|e| KeygenError::InvalidKeystore(format!("nonce: {e}")))?
        .try_into()
        .map_err(|_| KeygenError::InvalidKeystore("nonce size".to_string()))?;
    let ciphertext = BASE64
        .decode(&keystore.crypto.ciphertext)
        .map_err(|e| KeygenError::InvalidKeystore(format!("ciphertext: {e}")))?;

    let key = derive_encryption_key(passphrase, &salt, &keystore.crypto.kdf_params)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_ref())
        .map_err(|e| KeygenError::DecryptionFailed(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| KeygenError::DecryptionFailed("Authentication failed".to_string()))?,
    );

    let wallet = from_private_key(&plaintext)?;
    if wallet.address != keystore.address {
        return Err(KeygenError::InvalidKeystore(
            "decrypted key does not match keystore address".to_string(),
        ));
    }
    Ok(wallet)
}

/// Unencrypted dump of the key pair. Debug use only.
pub fn export_plaintext(wallet: &GeneratedWallet) -> PlaintextExport {
    PlaintextExport {
        address: wallet.address,
        private_key: wallet.private_key_hex(),
    }
}
