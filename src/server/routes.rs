//! Route handlers for the relay server.

use axum::{
    Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::registry::DocumentRegistry;
use super::websocket::WebSocketSession;

/// Shared application state
pub type AppState = Arc<DocumentRegistry>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents: usize,
}

/// Basic health check endpoint
pub async fn health(State(registry): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        documents: registry.len(),
    })
}

/// Current content of an open document
pub async fn document_content(
    Path(id): Path<String>,
    State(registry): State<AppState>,
) -> Response {
    match registry.get(&id) {
        Some(document) => Json(document.content()).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown document '{id}'")).into_response(),
    }
}

/// WebSocket connection handler for collaborative editing of one document
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(registry): State<AppState>,
) -> Response {
    let document = registry.open(&id);
    let connection = registry.next_connection_id();
    info!(document = %id, connection, "websocket upgrade requested");

    ws.on_upgrade(move |socket| WebSocketSession::new(socket, document, connection).handle())
}

/// Creates and configures the main application router
pub fn create_router(registry: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents/:id", get(document_content))
        .route("/documents/:id/ws", get(ws_handler))
        .with_state(registry)
}
