//! Error taxonomy shared by the pipeline and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::cipher::CipherError;
use crate::ledger::LedgerError;
use crate::policy::{Level, PolicyStoreError};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("retrieval of {file_id} not allowed: attention {attention} is below confidence {confidence}")]
    AccessDenied {
        file_id: String,
        attention: Level,
        confidence: Level,
    },

    /// A policy record exists but its payload (or half of it) does not.
    #[error("stored object for {file_id} is missing: {detail}")]
    ObjectMissing { file_id: String, detail: String },

    #[error("payload could not be decrypted: {0}")]
    Decryption(#[from] CipherError),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("internal fault: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn status(&self) -> StatusCode {
        match self {
            VaultError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            VaultError::NotFound(_) | VaultError::ObjectMissing { .. } => StatusCode::NOT_FOUND,
            VaultError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            VaultError::LedgerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            VaultError::Decryption(_) | VaultError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<PolicyStoreError> for VaultError {
    fn from(e: PolicyStoreError) -> Self {
        VaultError::Internal(e.to_string())
    }
}

impl From<LedgerError> for VaultError {
    fn from(e: LedgerError) -> Self {
        VaultError::LedgerUnavailable(e.to_string())
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(VaultError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(VaultError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            VaultError::AccessDenied {
                file_id: "x".into(),
                attention: Level::None,
                confidence: Level::Always,
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            VaultError::ObjectMissing {
                file_id: "x".into(),
                detail: "gone".into()
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            VaultError::Decryption(CipherError::Unauthenticated).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            VaultError::LedgerUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
