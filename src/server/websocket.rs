//! WebSocket session management for collaborative editing.
//!
//! Each session bootstraps its client with a snapshot of the document, then
//! relays operations both ways: operations from the client are applied to the
//! document replica and fanned out, operations from other sessions are forwarded.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use super::registry::{DocumentHandle, Relayed};
use crate::crdt::{Operation, RgaSnapshot};
use crate::manager::DocumentContent;

/// Messages accepted from clients
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A locally produced operation, in its JSON wire form
    Operation { payload: Value },
    GetContent,
}

/// Messages sent to clients
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot { state: RgaSnapshot },
    Operation { payload: Operation },
    Content(DocumentContent),
    Error { message: String },
}

type Sink = SplitSink<WebSocket, Message>;

/// WebSocket session for one connection to one document
pub struct WebSocketSession {
    socket: WebSocket,
    document: Arc<DocumentHandle>,
    connection: u64,
}

impl WebSocketSession {
    pub fn new(socket: WebSocket, document: Arc<DocumentHandle>, connection: u64) -> Self {
        Self {
            socket,
            document,
            connection,
        }
    }

    /// Handle the WebSocket connection lifecycle
    pub async fn handle(self) {
        let WebSocketSession {
            socket,
            document,
            connection,
        } = self;
        info!(document = %document.id(), connection, "websocket session established");

        let (mut sink, mut stream) = socket.split();
        let (state, mut updates) = document.join();
        if let Err(e) = send(&mut sink, &ServerMessage::Snapshot { state }).await {
            error!(connection, error = %e, "failed to send initial snapshot");
            return;
        }

        loop {
            tokio::select! {
                incoming = stream.next() => {
                    let Some(incoming) = incoming else { break };
                    match incoming {
                        Ok(Message::Text(text)) => {
                            let reply = handle_text(&document, connection, &text);
                            if let Some(reply) = reply {
                                if let Err(e) = send(&mut sink, &reply).await {
                                    error!(connection, error = %e, "failed to reply");
                                    break;
                                }
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                error!(connection, error = %e, "failed to send pong");
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => {
                            info!(connection, "websocket session closed by client");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(connection, error = %e, "websocket error");
                            break;
                        }
                    }
                }
                relayed = updates.recv() => {
                    match relayed {
                        Ok(Relayed { origin, operation }) => {
                            if origin == connection {
                                continue;
                            }
                            if let Err(e) = send(&mut sink, &ServerMessage::Operation { payload: operation }).await {
                                error!(connection, error = %e, "failed to forward operation");
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(connection, skipped, "session fell behind, resending snapshot");
                            let (state, fresh) = document.join();
                            updates = fresh;
                            if let Err(e) = send(&mut sink, &ServerMessage::Snapshot { state }).await {
                                error!(connection, error = %e, "failed to resend snapshot");
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        info!(document = %document.id(), connection, "websocket session ended");
    }
}

/// Processes one text frame. Malformed frames produce an error reply and
/// keep the connection open.
fn handle_text(document: &DocumentHandle, connection: u64, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection, error = %e, "failed to parse client message");
            return Some(ServerMessage::Error {
                message: format!("malformed message: {e}"),
            });
        }
    };

    match message {
        ClientMessage::Operation { payload } => {
            match Operation::from_value(payload) {
                Ok(operation) => {
                    let key = operation.dedup_key();
                    let relayed = document.submit(connection, operation);
                    debug!(connection, op = %key, relayed, "operation received");
                    None
                }
                Err(e) => {
                    warn!(connection, error = %e, "rejected operation");
                    Some(ServerMessage::Error {
                        message: e.to_string(),
                    })
                }
            }
        }
        ClientMessage::GetContent => Some(ServerMessage::Content(document.content())),
    }
}

async fn send(
    sink: &mut Sink,
    message: &ServerMessage,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string(message)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
