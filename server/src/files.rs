//! REST endpoints for the file pipeline.
//!
//! POST   /store            - multipart upload (`file` part + policy fields)
//! GET    /retrieve/{id}    - policy-gated download of the decrypted bytes
//! DELETE /files/{id}       - remove policy record and stored object
//! GET    /ledger/{id}      - latest ledger anchor for a file

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Serialize;

use crate::error::VaultError;
use crate::ledger::{signer, LedgerEntry};
use crate::pipeline::{StoreReceipt, Upload};
use crate::policy::PolicyInput;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    #[serde(flatten)]
    pub receipt: StoreReceipt,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub file_id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    /// Whether the entry's signature checks out against its owner key
    pub signature_valid: bool,
}

/// Text fields accepted next to the `file` part.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Option<Vec<u8>>,
    file_id: Option<String>,
    attention: Option<String>,
    confidence: Option<String>,
    label: Option<String>,
    access_rights: Option<String>,
    version: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, VaultError> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        VaultError::InvalidInput(format!("Malformed upload: {}", e))
    };
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.bytes = Some(field.bytes().await.map_err(bad)?.to_vec());
            }
            "fileId" => form.file_id = Some(field.text().await.map_err(bad)?),
            "attention" => form.attention = Some(field.text().await.map_err(bad)?),
            "confidence" => form.confidence = Some(field.text().await.map_err(bad)?),
            "label" => form.label = Some(field.text().await.map_err(bad)?),
            "accessRights" => form.access_rights = Some(field.text().await.map_err(bad)?),
            "version" => form.version = Some(field.text().await.map_err(bad)?),
            other => tracing::debug!("Ignoring unknown upload field {:?}", other),
        }
    }
    Ok(form)
}

/// POST /store
///
/// 201 when the object, policy and ledger anchor were all written; 202 when the
/// object and policy exist but the ledger did not confirm (partial success).
pub async fn store_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<StoreResponse>), VaultError> {
    let form = read_form(multipart).await?;

    let bytes = form
        .bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| VaultError::InvalidInput("No file uploaded".to_string()))?;

    // An explicit fileId wins over the uploaded file name
    let file_id = form
        .file_id
        .filter(|id| !id.trim().is_empty())
        .or(form.file_name)
        .ok_or_else(|| VaultError::InvalidInput("Upload has no file name or fileId".to_string()))?;

    let policy = PolicyInput::parse(
        form.access_rights.as_deref(),
        form.attention.as_deref(),
        form.confidence.as_deref(),
        form.label.as_deref(),
    )
    .map_err(VaultError::InvalidInput)?;

    let receipt = state
        .pipeline
        .store(Upload {
            file_id,
            bytes,
            policy,
            version: form.version,
        })
        .await?;

    let (status, message) = if receipt.is_anchored() {
        (
            StatusCode::CREATED,
            "File encrypted & stored + anchored + policy recorded".to_string(),
        )
    } else {
        (
            StatusCode::ACCEPTED,
            "File encrypted & stored + policy recorded; ledger anchor missing".to_string(),
        )
    };

    Ok((status, Json(StoreResponse { receipt, message })))
}

/// Quote-safe filename for Content-Disposition.
fn disposition_name(file_id: &str) -> String {
    file_id
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() || !c.is_ascii() { '_' } else { c })
        .collect()
}

/// GET /retrieve/{file_id}
///
/// Returns the raw decrypted bytes as an attachment. 403 when the policy
/// denies release, 404 when the record or the stored object is missing.
pub async fn retrieve_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<(StatusCode, HeaderMap, Vec<u8>), VaultError> {
    let retrieved = state.pipeline.retrieve(&file_id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = format!("attachment; filename=\"{}\"", disposition_name(&file_id));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|e| VaultError::Internal(format!("Bad disposition header: {}", e)))?,
    );

    Ok((StatusCode::OK, headers, retrieved.bytes))
}

/// DELETE /files/{file_id}
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<DeleteResponse>, VaultError> {
    let removed = state.pipeline.delete(&file_id).await?;
    Ok(Json(DeleteResponse {
        file_id: removed.file_id,
        deleted: true,
    }))
}

/// GET /ledger/{file_id}
pub async fn ledger_entry(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<LedgerEntryResponse>, VaultError> {
    let entry = state.pipeline.anchor_of(&file_id).await?;
    let signature_valid = signer::verify_entry(&entry);
    if !signature_valid {
        tracing::warn!("Ledger entry {} for {} has an invalid signature", entry.tx_ref, file_id);
    }
    Ok(Json(LedgerEntryResponse {
        entry,
        signature_valid,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_name_strips_quotes_and_controls() {
        assert_eq!(disposition_name("report.pdf"), "report.pdf");
        assert_eq!(disposition_name("a\"b\\c\nd"), "a_b_c_d");
        assert_eq!(disposition_name("résumé.pdf"), "r_sum_.pdf");
    }
}
