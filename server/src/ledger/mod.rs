//! Tamper-evidence anchors on an append-only ledger.
//!
//! Every successful store appends one signed entry binding
//! `(file_id, version, locator, content_hash)` to a timestamp and the signer's
//! public key. Entries are never revised; a later store for the same file id
//! appends another entry and `lookup` returns the most recent one.

pub mod memory;
pub mod rpc;
pub mod signer;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use signer::AnchorSigner;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger returned malformed data: {0}")]
    Malformed(String),
}

/// What the pipeline asks the ledger to witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRequest {
    pub file_id: String,
    pub version: String,
    pub locator: String,
    /// Hex SHA-256 of the stored ciphertext
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    /// Transaction reference assigned by the ledger
    pub tx_ref: String,
    /// Unix seconds at which the entry was confirmed
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub file_id: String,
    pub version: String,
    pub locator: String,
    pub content_hash: String,
    pub timestamp: i64,
    /// Hex ed25519 public key of the signer
    pub owner: String,
    /// Hex ed25519 signature over [`signer::anchor_message`]
    pub signature: String,
    pub tx_ref: String,
}

impl LedgerEntry {
    pub fn request(&self) -> AnchorRequest {
        AnchorRequest {
            file_id: self.file_id.clone(),
            version: self.version.clone(),
            locator: self.locator.clone(),
            content_hash: self.content_hash.clone(),
        }
    }
}

#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    /// Submit an entry and wait until the ledger has confirmed it.
    async fn anchor(&self, request: AnchorRequest) -> Result<Confirmation, LedgerError>;

    /// Most recent confirmed entry for `file_id`.
    async fn lookup(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError>;
}
