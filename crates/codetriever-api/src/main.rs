//! Codetriever API Server
//!
//! HTTP API server for the knowledge engine: indexing and querying a
//! source/docs workspace.

use codetriever_api::{bootstrap, routes};
use codetriever_config::EngineConfig;
use codetriever_config::validation::Validate;
use std::net::SocketAddr;
use tracing::info;

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult {
    codetriever_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Codetriever API server...");

    let config = EngineConfig::from_env();
    config.validate()?;
    info!(
        "Configuration loaded - API port: {}, embedding model: {}",
        config.api.port, config.embedding.model_id
    );

    let state = bootstrap::initialize_app_state(&config).await?;
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}
