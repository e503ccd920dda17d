//! Relay server for collaborative editing.
//!
//! Clients connect over WebSocket per document; the server keeps one replica
//! per document, bootstraps new clients from it and fans operations out.

pub mod registry;
pub mod routes;
pub mod websocket;

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use registry::{DocumentHandle, DocumentRegistry, Relayed};
pub use routes::{AppState, create_router};
pub use websocket::{ClientMessage, ServerMessage, WebSocketSession};

/// Serves the relay on `listener` until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    registry: Arc<DocumentRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    axum::serve(listener, create_router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}
