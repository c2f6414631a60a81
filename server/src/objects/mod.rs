//! Persistence of sealed payloads.
//!
//! A payload is stored as an inseparable pair: the ciphertext and the nonce it
//! was sealed with. Losing either half makes the object unreadable, so every
//! backend reports a missing half as [`ObjectError::NotFound`].
//!
//! Backends:
//! - [`local::LocalObjectStore`]: `{upload_dir}/{file_id}.enc` + `{file_id}.iv`
//! - [`ipfs::IpfsObjectStore`]: two CIDs, both carried in the locator
//! - [`memory::MemoryObjectStore`]: in-process map, used by tests

pub mod ipfs;
pub mod local;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cipher::Sealed;

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("object store backend error: {0}")]
    Backend(String),
}

/// Opaque handle returned by `put`, resolvable by the same backend's `get`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist both halves. Re-putting the same key replaces the object.
    async fn put(&self, file_id: &str, sealed: &Sealed) -> Result<Locator, ObjectError>;

    async fn get(&self, locator: &Locator) -> Result<Sealed, ObjectError>;

    /// Remove both halves. Removing an absent object is not an error.
    async fn delete(&self, locator: &Locator) -> Result<(), ObjectError>;
}
