use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{AnchorRequest, AnchorSigner, Confirmation, LedgerAnchor, LedgerEntry, LedgerError};

/// In-memory ledger with the same append-only, confirm-before-return contract
/// as the real adapters. Can be taken offline or slowed down to exercise the
/// pipeline's failure paths.
#[derive(Debug)]
pub struct MemoryLedger {
    signer: AnchorSigner,
    entries: DashMap<String, Vec<LedgerEntry>>,
    offline: AtomicBool,
    confirm_delay_ms: AtomicU64,
}

impl MemoryLedger {
    pub fn new(signer: AnchorSigner) -> Self {
        Self {
            signer,
            entries: DashMap::new(),
            offline: AtomicBool::new(false),
            confirm_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay applied before each confirmation.
    pub fn set_confirm_delay(&self, delay: Duration) {
        self.confirm_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Full history for a file id, oldest first.
    pub fn history(&self, file_id: &str) -> Vec<LedgerEntry> {
        self.entries
            .get(file_id)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("memory ledger is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerAnchor for MemoryLedger {
    async fn anchor(&self, request: AnchorRequest) -> Result<Confirmation, LedgerError> {
        self.ensure_online()?;

        let delay = self.confirm_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let entry = LedgerEntry {
            signature: self.signer.sign(&request),
            owner: self.signer.owner(),
            timestamp: Utc::now().timestamp(),
            tx_ref: uuid::Uuid::new_v4().to_string(),
            file_id: request.file_id,
            version: request.version,
            locator: request.locator,
            content_hash: request.content_hash,
        };
        let confirmation = Confirmation {
            tx_ref: entry.tx_ref.clone(),
            timestamp: entry.timestamp,
        };

        self.entries
            .entry(entry.file_id.clone())
            .or_default()
            .push(entry);

        Ok(confirmation)
    }

    async fn lookup(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        self.ensure_online()?;
        Ok(self
            .entries
            .get(file_id)
            .and_then(|e| e.last().cloned()))
    }
}
