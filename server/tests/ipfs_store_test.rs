//! Integration tests for the IPFS object store against a mock Kubo RPC node
//! serving `/api/v0/add`, `/api/v0/cat` and `/api/v0/pin/rm`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

use anchorvault_server::cipher::{CipherEngine, KEY_LEN};
use anchorvault_server::error::VaultError;
use anchorvault_server::ledger::memory::MemoryLedger;
use anchorvault_server::ledger::AnchorSigner;
use anchorvault_server::objects::ipfs::{parse_locator, IpfsObjectStore};
use anchorvault_server::objects::{ObjectError, ObjectStore};
use anchorvault_server::pipeline::{Pipeline, PipelineOptions, Upload};
use anchorvault_server::policy::memory::MemoryPolicyStore;
use anchorvault_server::policy::PolicyInput;

#[derive(Default)]
struct Node {
    blocks: HashMap<String, Vec<u8>>,
    pins: HashSet<String>,
    /// Query strings seen on `add`
    add_queries: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<Node>>;
type Params = Query<HashMap<String, String>>;

fn rpc_error(message: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "Message": message, "Code": 0, "Type": "error" })),
    )
}

async fn add(
    State(node): State<Shared>,
    Query(query): Params,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| rpc_error(e.to_string()))?
    {
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| rpc_error(e.to_string()))?;
        upload = Some((name, bytes.to_vec()));
    }
    let (name, bytes) = upload.ok_or_else(|| rpc_error("file argument was nil".to_string()))?;

    let cid = format!("bafk{}", &hex::encode(Sha256::digest(&bytes))[..32]);
    let size = bytes.len();
    let mut node = node.lock().unwrap();
    node.blocks.insert(cid.clone(), bytes);
    if query.get("pin").map(String::as_str) == Some("true") {
        node.pins.insert(cid.clone());
    }
    node.add_queries.push(query);
    Ok(Json(json!({ "Name": name, "Hash": cid, "Size": size.to_string() })))
}

async fn cat(
    State(node): State<Shared>,
    Query(query): Params,
) -> Result<Vec<u8>, (StatusCode, Json<Value>)> {
    let cid = query.get("arg").cloned().unwrap_or_default();
    node.lock()
        .unwrap()
        .blocks
        .get(&cid)
        .cloned()
        .ok_or_else(|| rpc_error(format!("block was not found locally (offline): {}", cid)))
}

async fn pin_rm(
    State(node): State<Shared>,
    Query(query): Params,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let cid = query.get("arg").cloned().unwrap_or_default();
    if node.lock().unwrap().pins.remove(&cid) {
        Ok(Json(json!({ "Pins": [cid] })))
    } else {
        Err(rpc_error("not pinned or pinned indirectly".to_string()))
    }
}

/// Helper: start a mock node on a random port and return (api_url, node).
async fn start_node() -> (String, Shared) {
    let node: Shared = Arc::new(Mutex::new(Node::default()));
    let app = Router::new()
        .route("/api/v0/add", post(add))
        .route("/api/v0/cat", post(cat))
        .route("/api/v0/pin/rm", post(pin_rm))
        .with_state(node.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), node)
}

fn pipeline_over(store: Arc<IpfsObjectStore>) -> Pipeline {
    Pipeline::new(
        CipherEngine::new([4u8; KEY_LEN]),
        store,
        Arc::new(MemoryPolicyStore::new()),
        Arc::new(MemoryLedger::new(AnchorSigner::generate())),
        PipelineOptions::default(),
    )
}

fn upload(file_id: &str, bytes: &[u8]) -> Upload {
    Upload {
        file_id: file_id.to_string(),
        bytes: bytes.to_vec(),
        policy: PolicyInput::default(),
        version: None,
    }
}

#[tokio::test]
async fn test_pipeline_roundtrip_through_ipfs() {
    let (api, node) = start_node().await;
    let store = Arc::new(IpfsObjectStore::new(&api, Duration::from_secs(5)).unwrap());
    let pipeline = pipeline_over(store);

    let receipt = pipeline
        .store(upload("report.pdf", b"%PDF-1.7 pinned on ipfs"))
        .await
        .unwrap();
    assert!(receipt.is_anchored());
    let (data_cid, nonce_cid) = parse_locator(&receipt.locator).unwrap();

    {
        let node = node.lock().unwrap();
        assert!(node.pins.contains(data_cid));
        assert!(node.pins.contains(nonce_cid));
        assert_eq!(node.blocks[nonce_cid].len(), 12);
        // the node only ever sees ciphertext
        assert_ne!(node.blocks[data_cid], b"%PDF-1.7 pinned on ipfs".to_vec());
        for query in &node.add_queries {
            assert_eq!(query["pin"], "true");
            assert_eq!(query["cid-version"], "1");
        }
    }

    let got = pipeline.retrieve("report.pdf").await.unwrap();
    assert_eq!(got.bytes, b"%PDF-1.7 pinned on ipfs");
}

#[tokio::test]
async fn test_missing_nonce_block_is_object_missing() {
    let (api, node) = start_node().await;
    let store = Arc::new(IpfsObjectStore::new(&api, Duration::from_secs(5)).unwrap());
    let pipeline = pipeline_over(store.clone());

    let receipt = pipeline.store(upload("a.bin", b"payload")).await.unwrap();
    let (_, nonce_cid) = parse_locator(&receipt.locator).unwrap();
    node.lock().unwrap().blocks.remove(nonce_cid);

    let err = store.get(&receipt.locator).await.unwrap_err();
    assert!(matches!(err, ObjectError::NotFound(_)), "{:?}", err);

    let err = pipeline.retrieve("a.bin").await.unwrap_err();
    assert!(matches!(err, VaultError::ObjectMissing { .. }), "{:?}", err);
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_unpins_and_is_idempotent() {
    let (api, node) = start_node().await;
    let store = Arc::new(IpfsObjectStore::new(&api, Duration::from_secs(5)).unwrap());
    let pipeline = pipeline_over(store.clone());

    let receipt = pipeline.store(upload("a.bin", b"payload")).await.unwrap();
    pipeline.delete("a.bin").await.unwrap();
    assert!(node.lock().unwrap().pins.is_empty());

    // second unpin of the same CIDs is not an error
    store.delete(&receipt.locator).await.unwrap();
    assert!(matches!(
        pipeline.retrieve("a.bin").await.unwrap_err(),
        VaultError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_node_failure_is_backend_error() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = IpfsObjectStore::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let pipeline = pipeline_over(Arc::new(store));

    let err = pipeline.store(upload("a.bin", b"payload")).await.unwrap_err();
    assert!(matches!(err, VaultError::Internal(_)), "{:?}", err);
}
