use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Locator, ObjectError, ObjectStore};
use crate::cipher::Sealed;

const SCHEME_PREFIX: &str = "mem://";

/// In-process object store. Counts reads so tests can assert that a denied
/// retrieval never touched the payload.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Sealed>,
    gets: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls so far, successful or not.
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn key(locator: &Locator) -> Result<&str, ObjectError> {
        locator
            .as_str()
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| ObjectError::InvalidKey(format!("not a memory locator: {}", locator)))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, file_id: &str, sealed: &Sealed) -> Result<Locator, ObjectError> {
        if file_id.is_empty() {
            return Err(ObjectError::InvalidKey("empty file id".to_string()));
        }
        self.objects.insert(file_id.to_string(), sealed.clone());
        Ok(Locator::new(format!("{}{}", SCHEME_PREFIX, file_id)))
    }

    async fn get(&self, locator: &Locator) -> Result<Sealed, ObjectError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(locator)?;
        self.objects
            .get(key)
            .map(|s| s.clone())
            .ok_or_else(|| ObjectError::NotFound(locator.to_string()))
    }

    async fn delete(&self, locator: &Locator) -> Result<(), ObjectError> {
        let key = Self::key(locator)?;
        self.objects.remove(key);
        Ok(())
    }
}
