//! Local append-only ledger in SQLite.
//!
//! Immutability is enforced by the schema: triggers abort any UPDATE or
//! DELETE on `ledger_entries` (see db/migrations.rs). Confirmation is the
//! committed INSERT.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use super::{AnchorRequest, AnchorSigner, Confirmation, LedgerAnchor, LedgerEntry, LedgerError};
use crate::db::DbPool;

#[derive(Clone)]
pub struct SqliteLedger {
    db: DbPool,
    signer: AnchorSigner,
}

impl SqliteLedger {
    pub fn new(db: DbPool, signer: AnchorSigner) -> Self {
        Self { db, signer }
    }
}

#[async_trait]
impl LedgerAnchor for SqliteLedger {
    async fn anchor(&self, request: AnchorRequest) -> Result<Confirmation, LedgerError> {
        let db = self.db.clone();
        let signature = self.signer.sign(&request);
        let owner = self.signer.owner();
        let tx_ref = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().timestamp();

        let confirmation = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| LedgerError::Unavailable(format!("DB lock: {}", e)))?;
            conn.execute(
                "INSERT INTO ledger_entries
                     (tx_ref, file_id, version, locator, content_hash, owner, signature, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    tx_ref,
                    request.file_id,
                    request.version,
                    request.locator,
                    request.content_hash,
                    owner,
                    signature,
                    timestamp,
                ],
            )
            .map_err(|e| LedgerError::Unavailable(format!("ledger insert: {}", e)))?;

            Ok::<_, LedgerError>(Confirmation { tx_ref, timestamp })
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("Task join: {}", e)))??;

        tracing::debug!("Anchored locally as {}", confirmation.tx_ref);
        Ok(confirmation)
    }

    async fn lookup(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let db = self.db.clone();
        let file_id = file_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| LedgerError::Unavailable(format!("DB lock: {}", e)))?;
            conn.query_row(
                "SELECT file_id, version, locator, content_hash, timestamp, owner, signature, tx_ref
                 FROM ledger_entries WHERE file_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                [&file_id],
                |row| {
                    Ok(LedgerEntry {
                        file_id: row.get(0)?,
                        version: row.get(1)?,
                        locator: row.get(2)?,
                        content_hash: row.get(3)?,
                        timestamp: row.get(4)?,
                        owner: row.get(5)?,
                        signature: row.get(6)?,
                        tx_ref: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(|e| LedgerError::Unavailable(format!("ledger query: {}", e)))
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("Task join: {}", e)))?
    }
}
