use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{PolicyStore, PolicyStoreError};
use super::{PolicyFields, PolicyRecord};

/// Process-local policy store. Records vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    records: DashMap<String, PolicyRecord>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn upsert(
        &self,
        file_id: &str,
        fields: PolicyFields,
    ) -> Result<PolicyRecord, PolicyStoreError> {
        let now = Utc::now();
        // The entry guard holds the shard lock, so racing upserts serialize here.
        let record = match self.records.entry(file_id.to_string()) {
            Entry::Occupied(mut e) => {
                e.get_mut().apply(fields, now);
                e.get().clone()
            }
            Entry::Vacant(e) => e.insert(PolicyRecord::new(file_id, fields, now)).clone(),
        };
        Ok(record)
    }

    async fn get_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        Ok(self.records.get(file_id).map(|r| r.clone()))
    }

    async fn delete_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        Ok(self.records.remove(file_id).map(|(_, r)| r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Level, PolicyInput};

    #[tokio::test]
    async fn test_upsert_keeps_single_record() {
        let store = MemoryPolicyStore::new();
        let first = store
            .upsert("f", PolicyInput::default().with_location("a"))
            .await
            .unwrap();

        let mut input = PolicyInput::default();
        input.attention = Level::None;
        let second = store.upsert("f", input.with_location("b")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(second.data_location, "b");
        assert_eq!(second.attention, Level::None);
        assert_eq!(second.created_at, first.created_at);
    }
}
