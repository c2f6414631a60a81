use async_trait::async_trait;

use super::{PolicyFields, PolicyRecord};

#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    #[error("policy store backend error: {0}")]
    Backend(String),
    #[error("policy service returned {status}: {body}")]
    Remote { status: u16, body: String },
}

/// Durable mapping from file id to its policy record.
///
/// Implementations guarantee at most one record per `file_id`; concurrent
/// upserts resolve to a single winner.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Create the record, or replace everything but `file_id` and `created_at`.
    async fn upsert(
        &self,
        file_id: &str,
        fields: PolicyFields,
    ) -> Result<PolicyRecord, PolicyStoreError>;

    async fn get_by_file_id(&self, file_id: &str)
        -> Result<Option<PolicyRecord>, PolicyStoreError>;

    /// Returns the removed record.
    async fn delete_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError>;
}
