//! Integration tests for the policy record service and the remote policy
//! store client that consumes it.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use anchorvault_server::cipher::{CipherEngine, KEY_LEN};
use anchorvault_server::ledger::memory::MemoryLedger;
use anchorvault_server::ledger::AnchorSigner;
use anchorvault_server::objects::memory::MemoryObjectStore;
use anchorvault_server::pipeline::{Pipeline, PipelineOptions, Upload};
use anchorvault_server::policy::memory::MemoryPolicyStore;
use anchorvault_server::policy::remote::RemotePolicyStore;
use anchorvault_server::policy::{Level, PolicyInput, PolicyStore};
use anchorvault_server::state::AppState;

fn memory_pipeline(policies: Arc<dyn PolicyStore>) -> Pipeline {
    Pipeline::new(
        CipherEngine::new([3u8; KEY_LEN]),
        Arc::new(MemoryObjectStore::new()),
        policies,
        Arc::new(MemoryLedger::new(AnchorSigner::generate())),
        PipelineOptions::default(),
    )
}

/// Helper: start a metadata-serving instance and return its base URL.
async fn start_test_server() -> String {
    let pipeline = memory_pipeline(Arc::new(MemoryPolicyStore::new()));
    let app = anchorvault_server::routes::build_router(AppState::new(pipeline, 100));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_metadata_crud() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/metadata", base_url))
        .json(&json!({
            "fileId": "report.pdf",
            "dataLocation": "mem://report.pdf",
            "attention": "Always",
            "confidence": "Usually",
            "label": "finance",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["accessRights"], "private");
    assert_eq!(created["label"], "finance");

    // second upsert replaces fields, keeps createdAt
    let resp = client
        .post(format!("{}/metadata", base_url))
        .json(&json!({
            "fileId": "report.pdf",
            "dataLocation": "mem://report.pdf",
            "accessRights": "public",
            "attention": "None",
        }))
        .send()
        .await
        .unwrap();
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["accessRights"], "public");
    assert_eq!(updated["attention"], "None");
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let resp = client
        .get(format!("{}/metadata/report.pdf", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{}/metadata/report.pdf", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/metadata/report.pdf", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_metadata_rejects_bad_levels() {
    let base_url = start_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/metadata", base_url))
        .json(&json!({
            "fileId": "a",
            "dataLocation": "mem://a",
            "confidence": "Mostly",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_pipeline_over_remote_policy_store() {
    let base_url = start_test_server().await;
    let remote: Arc<dyn PolicyStore> =
        Arc::new(RemotePolicyStore::new(&format!("{}/metadata", base_url)).unwrap());
    let pipeline = memory_pipeline(remote.clone());

    let mut policy = PolicyInput::default();
    policy.attention = Level::Usually;
    policy.confidence = Level::Sometimes;
    pipeline
        .store(Upload {
            file_id: "remote.bin".to_string(),
            bytes: b"stored through a remote policy service".to_vec(),
            policy,
            version: None,
        })
        .await
        .unwrap();

    let record = remote.get_by_file_id("remote.bin").await.unwrap().unwrap();
    assert_eq!(record.data_location, "mem://remote.bin");
    assert_eq!(record.attention, Level::Usually);

    let got = pipeline.retrieve("remote.bin").await.unwrap();
    assert_eq!(got.bytes, b"stored through a remote policy service");

    assert!(remote.get_by_file_id("missing").await.unwrap().is_none());
    assert!(remote.delete_by_file_id("remote.bin").await.unwrap().is_some());
    assert!(remote.delete_by_file_id("remote.bin").await.unwrap().is_none());
}
