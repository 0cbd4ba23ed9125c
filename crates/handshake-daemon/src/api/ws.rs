//! WebSocket endpoints
//!
//! Every connection is one [`Channel`]: a writer task drains the channel's
//! outbox into the socket, a reader task watches for the peer leaving, and
//! the gateway flow runs against the channel until one of them finishes.

use super::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{Channel, Gateway};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use handshake_types::SessionId;
use serde::Deserialize;
use std::sync::Arc;

const OUTBOX_CAPACITY: usize = 8;

/// What a connection asked for
#[derive(Debug, Clone)]
enum Flow {
    /// Code, then the terminal message, on one connection
    Handshake(SessionId),
    /// Code only
    Code(SessionId),
    /// Terminal message only
    Status(SessionId),
    /// Credential offer code for a DID
    Offer { did: String, answer: String },
}

impl Flow {
    fn label(&self) -> String {
        match self {
            Flow::Handshake(id) | Flow::Code(id) | Flow::Status(id) => id.to_string(),
            Flow::Offer { did, .. } => did.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OfferQuery {
    pub did: String,
    #[serde(default)]
    pub answer: String,
}

/// `/ws/handshake?sessionId=`; the id is generated when absent
pub async fn handshake_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> ApiResult<Response> {
    let session_id = match query.session_id {
        Some(id) => SessionId::new(id)?,
        None => SessionId::generate(),
    };
    Ok(upgrade(ws, state, Flow::Handshake(session_id)))
}

/// `/ws/qr-code?userId=`
pub async fn qr_code_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Response> {
    let session_id = SessionId::new(query.user_id)?;
    Ok(upgrade(ws, state, Flow::Code(session_id)))
}

/// `/ws/sso-status?userId=`
pub async fn sso_status_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Response> {
    let session_id = SessionId::new(query.user_id)?;
    Ok(upgrade(ws, state, Flow::Status(session_id)))
}

/// `/ws/qr-receive?did=&answer=`
pub async fn qr_receive_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<OfferQuery>,
) -> ApiResult<Response> {
    if query.did.is_empty() {
        return Err(ApiError::BadRequest("did must not be empty".to_string()));
    }
    Ok(upgrade(
        ws,
        state,
        Flow::Offer {
            did: query.did,
            answer: query.answer,
        },
    ))
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, flow: Flow) -> Response {
    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| serve(socket, gateway, flow))
}

async fn serve(socket: WebSocket, gateway: Arc<Gateway>, flow: Flow) {
    let label = flow.label();
    tracing::info!(channel = %label, "WebSocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (channel, mut outbox) = Channel::new(label.clone(), OUTBOX_CAPACITY);

    let writer_label = label.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let terminal = message.is_terminal();
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(channel = %writer_label, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::debug!(channel = %writer_label, error = %e, "Failed to send message");
                return;
            }
            if terminal {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let reader_label = label.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(channel = %reader_label, "Client initiated close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(channel = %reader_label, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    });

    let work = async {
        match &flow {
            Flow::Handshake(id) => gateway.run_handshake(id, &channel).await,
            Flow::Code(id) => gateway.send_auth_code(id, &channel).await,
            Flow::Status(id) => gateway.await_status(id, &channel).await,
            Flow::Offer { did, answer } => gateway.send_offer_code(did, answer, &channel).await,
        }
    };

    tokio::select! {
        _ = work => {}
        _ = &mut reader => {
            tracing::info!(channel = %label, "Peer disconnected");
        }
    }

    // Closing the outbox lets the writer flush what is queued and hang up
    drop(channel);
    let _ = writer.await;
    reader.abort();

    tracing::info!(channel = %label, "WebSocket connection closed");
}
