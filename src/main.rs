//! Main entry point for the collaborative editing relay server.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use collab_rga::ServerConfig;
use collab_rga::server::{self, DocumentRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    info!("Starting collaborative RGA relay...");

    let registry = Arc::new(DocumentRegistry::new(config.manager.clone()));
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    info!("Server listening on http://{}", config.addr);
    info!("Available endpoints:");
    info!("  GET  /health             - Health check");
    info!("  GET  /documents/:id      - Current document content");
    info!("  GET  /documents/:id/ws   - Collaborative editing session");

    server::run(listener, registry, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
    })
    .await?;

    Ok(())
}
