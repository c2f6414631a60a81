//! AES-256-GCM encryption of uploaded payloads.
//!
//! Every call to [`CipherEngine::encrypt`] draws a fresh random 12-byte nonce.
//! The nonce is returned next to the ciphertext (which includes the 16-byte GCM
//! tag) instead of being prefixed to it, because object stores persist the two
//! as separate artifacts.

pub mod keys;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::Rng;

/// Nonce length required by AES-256-GCM
pub const NONCE_LEN: usize = 12;

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("nonce must be {NONCE_LEN} bytes, got {0}")]
    BadNonce(usize),
    #[error("ciphertext could not be authenticated with the configured key")]
    Unauthenticated,
    #[error("encryption failed")]
    EncryptFailed,
}

/// Ciphertext plus the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Symmetric cipher bound to one process-wide key supplied at construction.
#[derive(Clone)]
pub struct CipherEngine {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine").finish_non_exhaustive()
    }
}

impl CipherEngine {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let key = Key::<Aes256Gcm>::from(key);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Build an engine from a hex-encoded 256-bit key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| CipherError::InvalidKey(format!("not hex: {}", e)))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CipherError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, b.len()))
        })?;
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, CipherError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CipherError::EncryptFailed)?;

        Ok(Sealed {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    /// Fails with [`CipherError::Unauthenticated`] on truncated or tampered
    /// ciphertext and when the key no longer matches.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CipherError> {
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::BadNonce(nonce.len()));
        }
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Unauthenticated)
    }
}
