use axum::{extract::DefaultBodyLimit, routing, Router};

use crate::files;
use crate::metadata;
use crate::state::AppState;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_size_mb as usize * 1024 * 1024;

    // Upload route carries its own body limit (default 100 MB)
    let upload_routes = Router::new()
        .route("/store", routing::post(files::store_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let file_routes = Router::new()
        .route("/retrieve/{file_id}", routing::get(files::retrieve_file))
        .route("/files/{file_id}", routing::delete(files::delete_file))
        .route("/ledger/{file_id}", routing::get(files::ledger_entry));

    // Policy record service (the interface RemotePolicyStore speaks)
    let metadata_routes = Router::new()
        .route("/metadata", routing::post(metadata::upsert_metadata))
        .route(
            "/metadata/{file_id}",
            routing::get(metadata::get_metadata).delete(metadata::delete_metadata),
        );

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(upload_routes)
        .merge(file_routes)
        .merge(metadata_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
