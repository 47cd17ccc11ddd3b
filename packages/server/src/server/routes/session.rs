//! Live session channel.
//!
//! GET /ws?token=JWT
//!
//! Browsers can't set headers on WebSocket upgrades, so the token comes as a
//! `?token=` query param, falling back to the Authorization header. Once
//! upgraded, the socket speaks `type`-tagged JSON frames and is wired to the
//! [`SessionRelay`](crate::kernel::SessionRelay) through its outbox.
//!
//! A `join` is admitted only for an active exchange the caller takes part in;
//! the room is named after the exchange id.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::{ConnectionId, ExchangeId, MemberId};
use crate::config::IceServer;
use crate::domains::exchanges::{ExchangeError, ExchangeStatus};
use crate::kernel::{RelayEvent, SignalKind};
use crate::server::app::AppState;
use crate::server::middleware::AuthUser;

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    /// JWT token for authentication
    token: Option<String>,
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join { room: String },
    Leave,
    Offer { room: String, payload: serde_json::Value },
    Answer { room: String, payload: serde_json::Value },
    IceCandidate { room: String, payload: serde_json::Value },
    Chat { room: String, payload: serde_json::Value },
}

impl ClientMessage {
    fn into_signal(self) -> Option<(SignalKind, String, serde_json::Value)> {
        match self {
            ClientMessage::Offer { room, payload } => Some((SignalKind::Offer, room, payload)),
            ClientMessage::Answer { room, payload } => Some((SignalKind::Answer, room, payload)),
            ClientMessage::IceCandidate { room, payload } => {
                Some((SignalKind::IceCandidate, room, payload))
            }
            ClientMessage::Chat { room, payload } => Some((SignalKind::Chat, room, payload)),
            ClientMessage::Join { .. } | ClientMessage::Leave => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
}

/// GET /session/ice-servers
pub async fn ice_servers_handler(
    Extension(state): Extension<AppState>,
    _user: AuthUser,
) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: state.ice_servers.as_ref().clone(),
    })
}

/// WebSocket upgrade handler.
///
/// Auth: Reads JWT from `?token=` query param, falls back to Authorization header.
pub async fn session_ws_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ExchangeError> {
    let credential = query
        .token
        .as_deref()
        .or_else(|| headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()));
    let member_id = state.gate.resolve(credential)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, member_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, member_id: MemberId) {
    let (connection_id, mut outbox) = state.relay.connect().await;
    info!(connection_id = %connection_id, member_id = %member_id, "Session socket opened");

    let (mut sender, mut receiver) = socket.split();

    // Drain the outbox into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode relay event"),
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        handle_client_message(&recv_state, connection_id, member_id, message)
                            .await
                    }
                    Err(e) => {
                        debug!(connection_id = %connection_id, error = %e, "Ignoring unparseable frame")
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.relay.disconnect(connection_id).await;
    info!(connection_id = %connection_id, "Session socket closed");
}

async fn handle_client_message(
    state: &AppState,
    connection_id: ConnectionId,
    member_id: MemberId,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join { room } => {
            let exchange_id = match admit_join(state, member_id, &room).await {
                Ok(exchange_id) => exchange_id,
                Err(e) => {
                    debug!(connection_id = %connection_id, room = %room, error = %e, "Join refused");
                    reject(state, connection_id, e.to_string()).await;
                    return;
                }
            };
            if let Err(e) = state
                .relay
                .join(connection_id, &exchange_id.to_string())
                .await
            {
                reject(state, connection_id, e.to_string()).await;
            }
        }
        ClientMessage::Leave => {
            state.relay.leave(connection_id).await;
        }
        signal => {
            if let Some((kind, room, payload)) = signal.into_signal() {
                state
                    .relay
                    .relay(connection_id, &canonical_room(&room), kind, payload)
                    .await;
            }
        }
    }
}

/// Room key for a client-supplied room name. Any spelling of an exchange id
/// maps to the same room.
fn canonical_room(room: &str) -> String {
    ExchangeId::parse(room.trim())
        .map(|id| id.to_string())
        .unwrap_or_else(|_| room.to_string())
}

/// Rooms are exchange ids; only participants of an active exchange get in.
async fn admit_join(
    state: &AppState,
    member_id: MemberId,
    room: &str,
) -> Result<ExchangeId, ExchangeError> {
    let exchange_id = ExchangeId::parse(room.trim())
        .map_err(|_| ExchangeError::ValidationError("Room must be an exchange id".to_string()))?;

    let exchange = state.lifecycle.get_exchange(exchange_id, member_id).await?;
    if exchange.status != ExchangeStatus::Active {
        return Err(ExchangeError::InvalidState(format!(
            "Sessions are only open for active exchanges, this one is {}",
            exchange.status
        )));
    }
    Ok(exchange_id)
}

async fn reject(state: &AppState, connection_id: ConnectionId, message: String) {
    state
        .relay
        .notify(connection_id, RelayEvent::Error { message })
        .await;
}
