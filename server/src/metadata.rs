//! Policy record service.
//!
//! POST   /metadata            - upsert by body (`fileId` + fields)
//! GET    /metadata/{fileId}   - fetch one record
//! DELETE /metadata/{fileId}   - remove one record
//!
//! This is the interface `RemotePolicyStore` consumes, so one instance can
//! serve another's policy records.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::VaultError;
use crate::policy::{PolicyInput, PolicyRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMetadataRequest {
    pub file_id: String,
    pub data_location: String,
    pub access_rights: Option<String>,
    pub attention: Option<String>,
    pub confidence: Option<String>,
    pub label: Option<String>,
}

/// POST /metadata
pub async fn upsert_metadata(
    State(state): State<AppState>,
    Json(req): Json<UpsertMetadataRequest>,
) -> Result<Json<PolicyRecord>, VaultError> {
    if req.file_id.trim().is_empty() || req.data_location.trim().is_empty() {
        return Err(VaultError::InvalidInput(
            "fileId and dataLocation are required".to_string(),
        ));
    }

    let fields = PolicyInput::parse(
        req.access_rights.as_deref(),
        req.attention.as_deref(),
        req.confidence.as_deref(),
        req.label.as_deref(),
    )
    .map_err(VaultError::InvalidInput)?
    .with_location(req.data_location);

    let record = state.pipeline.policies().upsert(&req.file_id, fields).await?;
    Ok(Json(record))
}

/// GET /metadata/{file_id}
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<PolicyRecord>, VaultError> {
    state
        .pipeline
        .policies()
        .get_by_file_id(&file_id)
        .await?
        .map(Json)
        .ok_or_else(|| VaultError::NotFound(format!("policy record for {}", file_id)))
}

/// DELETE /metadata/{file_id}
pub async fn delete_metadata(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<PolicyRecord>, VaultError> {
    state
        .pipeline
        .policies()
        .delete_by_file_id(&file_id)
        .await?
        .map(Json)
        .ok_or_else(|| VaultError::NotFound(format!("policy record for {}", file_id)))
}
