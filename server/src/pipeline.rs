//! Encrypt, store, anchor and policy-gated retrieval.
//!
//! `store` runs encrypt → object put → policy upsert → ledger anchor, in that
//! order, so a policy record never points at an object that was not written.
//! The anchor runs last and without any store lock held; when it fails the
//! object and policy stay in place and the receipt reports the anchor as
//! missing.
//!
//! `retrieve` evaluates the policy gate before any read of the encrypted
//! payload. Neither a denial nor a miss mutates anything.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::cipher::CipherEngine;
use crate::error::VaultError;
use crate::ledger::{AnchorRequest, LedgerAnchor, LedgerEntry};
use crate::objects::{Locator, ObjectError, ObjectStore};
use crate::policy::{gate, PolicyInput, PolicyRecord, PolicyStore};

pub const DEFAULT_VERSION: &str = "v1.0";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound on the wait for ledger confirmation
    pub anchor_timeout: Duration,
    /// Version anchored when the upload does not name one
    pub default_version: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            anchor_timeout: Duration::from_secs(30),
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_id: String,
    pub bytes: Vec<u8>,
    pub policy: PolicyInput,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnchorStatus {
    Confirmed {
        #[serde(rename = "txRef")]
        tx_ref: String,
        timestamp: i64,
    },
    /// Object and policy were written but the ledger never confirmed.
    Missing { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReceipt {
    pub file_id: String,
    pub locator: Locator,
    pub version: String,
    pub content_hash: String,
    pub anchor: AnchorStatus,
}

impl StoreReceipt {
    pub fn is_anchored(&self) -> bool {
        matches!(self.anchor, AnchorStatus::Confirmed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub file_id: String,
    pub bytes: Vec<u8>,
}

/// The explicit context every request goes through. Holds no mutable state of
/// its own; all sharing happens inside the adapters.
pub struct Pipeline {
    cipher: CipherEngine,
    objects: Arc<dyn ObjectStore>,
    policies: Arc<dyn PolicyStore>,
    ledger: Arc<dyn LedgerAnchor>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        cipher: CipherEngine,
        objects: Arc<dyn ObjectStore>,
        policies: Arc<dyn PolicyStore>,
        ledger: Arc<dyn LedgerAnchor>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            cipher,
            objects,
            policies,
            ledger,
            options,
        }
    }

    pub fn policies(&self) -> &Arc<dyn PolicyStore> {
        &self.policies
    }

    pub async fn store(&self, upload: Upload) -> Result<StoreReceipt, VaultError> {
        let Upload {
            file_id,
            bytes,
            policy,
            version,
        } = upload;

        if file_id.trim().is_empty() {
            return Err(VaultError::InvalidInput("missing file id".to_string()));
        }
        if bytes.is_empty() {
            return Err(VaultError::InvalidInput("No file uploaded".to_string()));
        }
        let version = version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.options.default_version.clone());

        let sealed = self
            .cipher
            .encrypt(&bytes)
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        let content_hash = hex::encode(Sha256::digest(&sealed.ciphertext));

        let locator = self
            .objects
            .put(&file_id, &sealed)
            .await
            .map_err(|e| match e {
                ObjectError::InvalidKey(msg) => VaultError::InvalidInput(msg),
                other => VaultError::Internal(other.to_string()),
            })?;

        self.policies
            .upsert(&file_id, policy.with_location(locator.as_str()))
            .await?;

        let request = AnchorRequest {
            file_id: file_id.clone(),
            version: version.clone(),
            locator: locator.to_string(),
            content_hash: content_hash.clone(),
        };
        let anchor =
            match tokio::time::timeout(self.options.anchor_timeout, self.ledger.anchor(request))
                .await
            {
                Ok(Ok(confirmation)) => AnchorStatus::Confirmed {
                    tx_ref: confirmation.tx_ref,
                    timestamp: confirmation.timestamp,
                },
                Ok(Err(e)) => AnchorStatus::Missing {
                    reason: VaultError::from(e).to_string(),
                },
                Err(_) => AnchorStatus::Missing {
                    reason: VaultError::LedgerUnavailable(format!(
                        "no confirmation within {}s",
                        self.options.anchor_timeout.as_secs_f32()
                    ))
                    .to_string(),
                },
            };

        match &anchor {
            AnchorStatus::Confirmed { tx_ref, .. } => {
                tracing::info!("Stored {} at {} (anchored as {})", file_id, locator, tx_ref)
            }
            AnchorStatus::Missing { reason } => tracing::warn!(
                "Stored {} at {} but anchoring failed: {}",
                file_id,
                locator,
                reason
            ),
        }

        Ok(StoreReceipt {
            file_id,
            locator,
            version,
            content_hash,
            anchor,
        })
    }

    pub async fn retrieve(&self, file_id: &str) -> Result<Retrieved, VaultError> {
        let record = self.record(file_id).await?;

        gate::check(&record).map_err(|denial| VaultError::AccessDenied {
            file_id: file_id.to_string(),
            attention: denial.attention,
            confidence: denial.confidence,
        })?;

        let sealed = self
            .objects
            .get(&Locator::new(record.data_location.clone()))
            .await
            .map_err(|e| match e {
                ObjectError::NotFound(detail) | ObjectError::InvalidKey(detail) => {
                    VaultError::ObjectMissing {
                        file_id: file_id.to_string(),
                        detail,
                    }
                }
                ObjectError::Backend(msg) => VaultError::Internal(msg),
            })?;

        let bytes = self.cipher.decrypt(&sealed.ciphertext, &sealed.nonce)?;

        tracing::debug!("Released {} ({} bytes)", file_id, bytes.len());
        Ok(Retrieved {
            file_id: file_id.to_string(),
            bytes,
        })
    }

    /// Remove the policy record and its object. Ledger entries stay.
    pub async fn delete(&self, file_id: &str) -> Result<PolicyRecord, VaultError> {
        let record = self.record(file_id).await?;

        match self
            .objects
            .delete(&Locator::new(record.data_location.clone()))
            .await
        {
            Ok(()) => {}
            // foreign locator: nothing this backend can remove
            Err(ObjectError::InvalidKey(msg)) => {
                tracing::warn!("Deleting {} without its object: {}", file_id, msg)
            }
            Err(e) => return Err(VaultError::Internal(e.to_string())),
        }

        let removed = self
            .policies
            .delete_by_file_id(file_id)
            .await?
            .unwrap_or(record);

        tracing::info!("Deleted {}", file_id);
        Ok(removed)
    }

    /// Most recent ledger entry for `file_id`.
    pub async fn anchor_of(&self, file_id: &str) -> Result<LedgerEntry, VaultError> {
        self.ledger
            .lookup(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("ledger entry for {}", file_id)))
    }

    async fn record(&self, file_id: &str) -> Result<PolicyRecord, VaultError> {
        self.policies
            .get_by_file_id(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("policy record for {}", file_id)))
    }
}
