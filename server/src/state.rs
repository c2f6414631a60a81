use std::sync::Arc;
use std::time::Duration;

use crate::cipher::{self, CipherEngine};
use crate::config::{Config, LedgerBackend, MetadataBackend, StorageBackend};
use crate::db;
use crate::ledger::memory::MemoryLedger;
use crate::ledger::rpc::RpcLedger;
use crate::ledger::sqlite::SqliteLedger;
use crate::ledger::{AnchorSigner, LedgerAnchor};
use crate::objects::ipfs::IpfsObjectStore;
use crate::objects::local::LocalObjectStore;
use crate::objects::memory::MemoryObjectStore;
use crate::objects::ObjectStore;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::policy::memory::MemoryPolicyStore;
use crate::policy::remote::RemotePolicyStore;
use crate::policy::sqlite::SqlitePolicyStore;
use crate::policy::PolicyStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The one pipeline built at startup
    pub pipeline: Arc<Pipeline>,
    /// Maximum accepted upload body in megabytes
    pub max_upload_size_mb: u32,
}

impl AppState {
    pub fn new(pipeline: Pipeline, max_upload_size_mb: u32) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            max_upload_size_mb,
        }
    }
}

/// Wire the configured backends into a pipeline. The SQLite database is only
/// opened when a backend needs it.
pub fn build_pipeline(config: &Config) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let cipher = match config.cipher_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key_hex) => {
            tracing::info!("Cipher key taken from configuration");
            CipherEngine::from_hex(key_hex)?
        }
        None => CipherEngine::new(cipher::keys::load_or_generate_cipher_key(&config.data_dir)?),
    };

    let needs_db = config.metadata.backend == MetadataBackend::Sqlite
        || config.ledger.backend == LedgerBackend::Sqlite;
    let db = if needs_db {
        Some(db::init_db(&config.data_dir)?)
    } else {
        None
    };

    let objects: Arc<dyn ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let dir = config.upload_dir();
            tracing::info!("Object storage: local directory {}", dir);
            Arc::new(LocalObjectStore::new(dir))
        }
        StorageBackend::Ipfs => {
            tracing::info!("Object storage: IPFS node at {}", config.storage.ipfs_api_url);
            Arc::new(IpfsObjectStore::new(
                &config.storage.ipfs_api_url,
                Duration::from_secs(config.storage.ipfs_timeout_secs),
            )?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Object storage: in-memory, objects are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let policies: Arc<dyn PolicyStore> = match (config.metadata.backend, &db) {
        (MetadataBackend::Sqlite, Some(db)) => Arc::new(SqlitePolicyStore::new(db.clone())),
        (MetadataBackend::Remote, _) => {
            tracing::info!("Policy records: remote service at {}", config.metadata.remote_url);
            Arc::new(RemotePolicyStore::new(&config.metadata.remote_url)?)
        }
        (MetadataBackend::Memory, _) => {
            tracing::warn!("Policy records: in-memory, records are lost on restart");
            Arc::new(MemoryPolicyStore::new())
        }
        (MetadataBackend::Sqlite, None) => return Err("sqlite policy store without a database".into()),
    };

    let signer = match config.ledger.signer_key.as_deref().filter(|k| !k.is_empty()) {
        Some(seed_hex) => AnchorSigner::from_hex(seed_hex)?,
        None => AnchorSigner::load_or_generate(&config.data_dir)?,
    };
    tracing::info!("Anchors signed as {}", signer.owner());

    let ledger: Arc<dyn LedgerAnchor> = match (config.ledger.backend, &db) {
        (LedgerBackend::Sqlite, Some(db)) => Arc::new(SqliteLedger::new(db.clone(), signer)),
        (LedgerBackend::Rpc, _) => {
            tracing::info!("Ledger: JSON-RPC gateway at {}", config.ledger.rpc_url);
            Arc::new(RpcLedger::new(
                &config.ledger.rpc_url,
                config.ledger.api_token.clone(),
                signer,
                Duration::from_millis(config.ledger.poll_interval_ms),
                Duration::from_secs(config.ledger.rpc_timeout_secs),
            )?)
        }
        (LedgerBackend::Memory, _) => {
            tracing::warn!("Ledger: in-memory, anchors are lost on restart");
            Arc::new(MemoryLedger::new(signer))
        }
        (LedgerBackend::Sqlite, None) => return Err("sqlite ledger without a database".into()),
    };

    Ok(Pipeline::new(
        cipher,
        objects,
        policies,
        ledger,
        PipelineOptions {
            anchor_timeout: Duration::from_secs(config.ledger.anchor_timeout_secs),
            default_version: config.ledger.default_version.clone(),
        },
    ))
}
