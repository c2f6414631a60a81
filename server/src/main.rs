use std::net::SocketAddr;

use tokio::net::TcpListener;

use anchorvault_server::config::{generate_config_template, Config};
use anchorvault_server::{routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("anchorvault_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Anchorvault server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Backends: storage={:?}, metadata={:?}, ledger={:?}",
        config.storage.backend,
        config.metadata.backend,
        config.ledger.backend
    );

    // Keys are loaded (or generated) here, never compiled in
    let pipeline = state::build_pipeline(&config)?;
    let app_state = state::AppState::new(pipeline, config.max_upload_size_mb);

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
