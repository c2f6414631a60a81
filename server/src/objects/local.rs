//! Sealed objects as sibling files on local disk.
//!
//! Layout: `{upload_dir}/{file_id}.enc` holds the ciphertext and
//! `{upload_dir}/{file_id}.iv` the nonce. The locator is the `.enc` path.
//! Both halves are staged as temporary siblings and renamed into place while
//! the file id's lock is held, so readers never see halves from different
//! writes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Locator, ObjectError, ObjectStore};
use crate::cipher::Sealed;

const CIPHERTEXT_SUFFIX: &str = ".enc";
const NONCE_SUFFIX: &str = ".iv";

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    upload_dir: PathBuf,
    /// One lock per ciphertext path, shared by clones of the store
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LocalObjectStore {
    /// The directory is created lazily on the first `put`.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn ciphertext_path(&self, file_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{}{}", file_id, CIPHERTEXT_SUFFIX))
    }

    fn nonce_path(&self, file_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{}{}", file_id, NONCE_SUFFIX))
    }

    /// Map a locator back to its (ciphertext, nonce) paths under the current
    /// upload directory, refusing anything that lives elsewhere.
    fn resolve(&self, locator: &Locator) -> Result<(PathBuf, PathBuf), ObjectError> {
        let path = Path::new(locator.as_str());
        let file_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(CIPHERTEXT_SUFFIX))
            .filter(|id| validate_file_id(id).is_ok())
            .ok_or_else(|| ObjectError::InvalidKey(format!("not a local locator: {}", locator)))?;

        if !self.is_upload_dir(path.parent().unwrap_or_else(|| Path::new(""))) {
            return Err(ObjectError::InvalidKey(format!(
                "{} is outside {}",
                locator,
                self.upload_dir.display()
            )));
        }

        Ok((self.ciphertext_path(file_id), self.nonce_path(file_id)))
    }

    /// Locators keep the directory spelling they were written with, so a
    /// relative/absolute or `..` difference falls back to canonical paths.
    fn is_upload_dir(&self, dir: &Path) -> bool {
        if dir == self.upload_dir {
            return true;
        }
        match (std::fs::canonicalize(dir), std::fs::canonicalize(&self.upload_dir)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    async fn lock(&self, enc_path: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(enc_path.to_path_buf())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// File ids become file names, so anything that could escape the upload
/// directory is refused.
fn validate_file_id(file_id: &str) -> Result<(), ObjectError> {
    let bad = file_id.is_empty()
        || file_id == "."
        || file_id == ".."
        || file_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(ObjectError::InvalidKey(format!(
            "{:?} cannot be used as a file name",
            file_id
        )));
    }
    Ok(())
}

/// Write `bytes` to a fresh temporary sibling of `path` and return its path.
fn stage(path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("object"),
        uuid::Uuid::new_v4()
    ));
    std::fs::write(&tmp, bytes).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })?;
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> std::io::Result<()> {
    std::fs::rename(tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(tmp);
    })
}

fn read_half(path: &Path) -> Result<Vec<u8>, ObjectError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ObjectError::NotFound(path.display().to_string()),
        _ => ObjectError::Backend(format!("Failed to read {}: {}", path.display(), e)),
    })
}

fn remove_half(path: &Path) -> Result<(), ObjectError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ObjectError::Backend(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ObjectError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ObjectError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ObjectError::Backend(format!("Task join error: {}", e)))?
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, file_id: &str, sealed: &Sealed) -> Result<Locator, ObjectError> {
        validate_file_id(file_id)?;

        let dir = self.upload_dir.clone();
        let enc_path = self.ciphertext_path(file_id);
        let iv_path = self.nonce_path(file_id);
        let locator = Locator::new(enc_path.to_string_lossy().into_owned());
        let sealed = sealed.clone();

        let guard = self.lock(&enc_path).await;
        blocking(move || {
            let _guard = guard;
            std::fs::create_dir_all(&dir)
                .map_err(|e| ObjectError::Backend(format!("Failed to create upload directory: {}", e)))?;

            let iv_tmp = stage(&iv_path, &sealed.nonce)
                .map_err(|e| ObjectError::Backend(format!("Failed to write nonce: {}", e)))?;
            let enc_tmp = stage(&enc_path, &sealed.ciphertext).map_err(|e| {
                let _ = std::fs::remove_file(&iv_tmp);
                ObjectError::Backend(format!("Failed to write ciphertext: {}", e))
            })?;

            // nonce first: a visible ciphertext always has its companion
            commit(&iv_tmp, &iv_path).map_err(|e| {
                let _ = std::fs::remove_file(&enc_tmp);
                ObjectError::Backend(format!("Failed to store nonce: {}", e))
            })?;
            commit(&enc_tmp, &enc_path)
                .map_err(|e| ObjectError::Backend(format!("Failed to store ciphertext: {}", e)))?;

            tracing::debug!(
                "Stored {} ({} ciphertext bytes)",
                enc_path.display(),
                sealed.ciphertext.len()
            );
            Ok(())
        })
        .await?;

        Ok(locator)
    }

    async fn get(&self, locator: &Locator) -> Result<Sealed, ObjectError> {
        let (enc_path, iv_path) = self.resolve(locator)?;
        let guard = self.lock(&enc_path).await;
        blocking(move || {
            let _guard = guard;
            let ciphertext = read_half(&enc_path)?;
            let nonce = read_half(&iv_path)?;
            Ok(Sealed { nonce, ciphertext })
        })
        .await
    }

    async fn delete(&self, locator: &Locator) -> Result<(), ObjectError> {
        let (enc_path, iv_path) = self.resolve(locator)?;
        let guard = self.lock(&enc_path).await;
        blocking(move || {
            let _guard = guard;
            remove_half(&enc_path)?;
            remove_half(&iv_path)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(tag: u8) -> Sealed {
        Sealed {
            nonce: vec![tag; 12],
            ciphertext: vec![tag; 40],
        }
    }

    #[tokio::test]
    async fn test_put_creates_sibling_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path().join("uploads"));

        let locator = store.put("report.pdf", &sealed(1)).await.unwrap();

        assert!(locator.as_str().ends_with("report.pdf.enc"));
        assert!(tmp.path().join("uploads/report.pdf.enc").exists());
        assert!(tmp.path().join("uploads/report.pdf.iv").exists());
        assert_eq!(store.get(&locator).await.unwrap(), sealed(1));
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_object() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        let first = store.put("a.bin", &sealed(1)).await.unwrap();
        let second = store.put("a.bin", &sealed(2)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get(&second).await.unwrap(), sealed(2));
        // no temporary files left behind
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_missing_nonce_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());
        let locator = store.put("a.bin", &sealed(3)).await.unwrap();

        std::fs::remove_file(tmp.path().join("a.bin.iv")).unwrap();

        let err = store.get(&locator).await.unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        for id in ["", "..", "../escape", "a/b", "a\\b"] {
            let err = store.put(id, &sealed(0)).await.unwrap_err();
            assert!(matches!(err, ObjectError::InvalidKey(_)), "{:?} accepted", id);
        }
    }

    #[tokio::test]
    async fn test_rejects_foreign_locator() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());

        let err = store.get(&Locator::new("/etc/passwd.enc")).await.unwrap_err();
        assert!(matches!(err, ObjectError::InvalidKey(_)));
        let err = store.get(&Locator::new("ipfs://bafy")).await.unwrap_err();
        assert!(matches!(err, ObjectError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_both_halves_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());
        let locator = store.put("a.bin", &sealed(4)).await.unwrap();

        store.delete(&locator).await.unwrap();
        store.delete(&locator).await.unwrap();

        assert!(!tmp.path().join("a.bin.enc").exists());
        assert!(!tmp.path().join("a.bin.iv").exists());
        assert!(matches!(
            store.get(&locator).await.unwrap_err(),
            ObjectError::NotFound(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_restores_keep_pairs_consistent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(tmp.path());
        let pair = |tag: u8| Sealed {
            nonce: vec![tag; 12],
            ciphertext: vec![tag; 4096],
        };
        let locator = store.put("race.bin", &pair(0)).await.unwrap();

        for round in 0..50 {
            let mut tasks = Vec::new();
            for tag in 1..=8u8 {
                let writer = store.clone();
                tasks.push(tokio::spawn(async move {
                    writer.put("race.bin", &pair(tag)).await.unwrap();
                }));
                let reader = store.clone();
                let locator = locator.clone();
                tasks.push(tokio::spawn(async move {
                    let got = reader.get(&locator).await.unwrap();
                    assert_eq!(got.nonce[0], got.ciphertext[0], "torn read");
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            let got = store.get(&locator).await.unwrap();
            assert!(got.nonce.iter().all(|b| *b == got.ciphertext[0]), "round {}", round);
            assert!(got.ciphertext.iter().all(|b| *b == got.nonce[0]), "round {}", round);
        }
        // staged temporaries never outlive a put
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_locator_resolves_through_equivalent_directory_spelling() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        let writer = LocalObjectStore::new(tmp.path().join("uploads"));
        let locator = writer.put("a.bin", &sealed(5)).await.unwrap();

        let reader = LocalObjectStore::new(tmp.path().join("sub/../uploads"));
        assert_eq!(reader.get(&locator).await.unwrap(), sealed(5));

        // a sibling directory is still foreign
        let other = LocalObjectStore::new(tmp.path().join("sub"));
        assert!(matches!(
            other.get(&locator).await.unwrap_err(),
            ObjectError::InvalidKey(_)
        ));
    }
}
