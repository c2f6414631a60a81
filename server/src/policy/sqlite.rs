//! Policy records in the embedded SQLite database.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{OptionalExtension, Row};

use super::store::{PolicyStore, PolicyStoreError};
use super::{AccessRights, Level, PolicyFields, PolicyRecord};
use crate::db::DbPool;

impl ToSql for Level {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Level {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for AccessRights {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccessRights {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

const COLUMNS: &str =
    "file_id, data_location, access_rights, attention, confidence, label, created_at, updated_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PolicyRecord> {
    Ok(PolicyRecord {
        file_id: row.get(0)?,
        data_location: row.get(1)?,
        access_rights: row.get(2)?,
        attention: row.get(3)?,
        confidence: row.get(4)?,
        label: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[derive(Clone)]
pub struct SqlitePolicyStore {
    db: DbPool,
}

impl SqlitePolicyStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a closure against the locked connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PolicyStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| PolicyStoreError::Backend(format!("DB lock: {}", e)))?;
            f(&conn).map_err(|e| PolicyStoreError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| PolicyStoreError::Backend(format!("Task join: {}", e)))?
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn upsert(
        &self,
        file_id: &str,
        fields: PolicyFields,
    ) -> Result<PolicyRecord, PolicyStoreError> {
        let file_id = file_id.to_string();
        let now = Utc::now();

        let record = self
            .with_conn(move |conn| {
                // created_at is deliberately absent from the update list
                conn.query_row(
                    &format!(
                        "INSERT INTO policy_records ({COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                         ON CONFLICT(file_id) DO UPDATE SET
                             data_location = excluded.data_location,
                             access_rights = excluded.access_rights,
                             attention = excluded.attention,
                             confidence = excluded.confidence,
                             label = excluded.label,
                             updated_at = excluded.updated_at
                         RETURNING {COLUMNS}"
                    ),
                    rusqlite::params![
                        file_id,
                        fields.data_location,
                        fields.access_rights,
                        fields.attention,
                        fields.confidence,
                        fields.label,
                        now,
                    ],
                    row_to_record,
                )
            })
            .await?;

        tracing::debug!(
            "Upserted policy for {} (attention={}, confidence={})",
            record.file_id,
            record.attention,
            record.confidence
        );
        Ok(record)
    }

    async fn get_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        let file_id = file_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM policy_records WHERE file_id = ?1"),
                [&file_id],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    async fn delete_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        let file_id = file_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("DELETE FROM policy_records WHERE file_id = ?1 RETURNING {COLUMNS}"),
                [&file_id],
                row_to_record,
            )
            .optional()
        })
        .await
    }
}
