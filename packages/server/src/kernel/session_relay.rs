//! In-process room broker for live exchange sessions.
//!
//! Connections join a room (named after the exchange id) and relay opaque
//! signaling and chat payloads to every other member. Nothing is persisted and
//! payloads are never inspected.
//!
//! # Usage
//!
//! Connection tasks (WebSocket handlers):
//!   let (connection_id, mut outbox) = relay.connect().await;
//!   relay.join(connection_id, "b3d1...").await?;
//!   relay.relay(connection_id, "b3d1...", SignalKind::Chat, json!("hi")).await;
//!   relay.disconnect(connection_id).await;
//!
//! Each connection owns a bounded outbox. Delivery uses `try_send`, so a slow
//! or dead peer loses its own messages and never stalls the sender or the room.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::common::ConnectionId;

/// Payload kinds a member may relay to the rest of its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Chat,
}

/// Events delivered to a connection's outbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayEvent {
    /// Acknowledges a join; `peers` counts the other members already present.
    Joined { room: String, peers: usize },
    PeerJoined { room: String },
    PeerLeft { room: String },
    Offer { room: String, payload: serde_json::Value },
    Answer { room: String, payload: serde_json::Value },
    IceCandidate { room: String, payload: serde_json::Value },
    Chat { room: String, payload: serde_json::Value },
    Error { message: String },
}

impl RelayEvent {
    pub fn signal(kind: SignalKind, room: String, payload: serde_json::Value) -> Self {
        match kind {
            SignalKind::Offer => RelayEvent::Offer { room, payload },
            SignalKind::Answer => RelayEvent::Answer { room, payload },
            SignalKind::IceCandidate => RelayEvent::IceCandidate { room, payload },
            SignalKind::Chat => RelayEvent::Chat { room, payload },
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JoinError {
    #[error("Connection is not registered")]
    UnknownConnection,

    #[error("Room name must not be empty")]
    InvalidRoom,

    #[error("Room {room} is full ({capacity} members)")]
    RoomFull { room: String, capacity: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Maximum members per room. `None` means unlimited.
    pub room_capacity: Option<usize>,
    /// Buffered events per connection before deliveries are dropped.
    pub outbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_capacity: None,
            outbox_capacity: 256,
        }
    }
}

struct ConnectionEntry {
    outbox: mpsc::Sender<RelayEvent>,
    room: Option<String>,
}

#[derive(Default)]
struct RelayState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RelayState {
    /// Send to one connection without waiting. Returns whether it was queued.
    fn deliver(&self, to: ConnectionId, event: RelayEvent) -> bool {
        let Some(entry) = self.connections.get(&to) else {
            return false;
        };
        match entry.outbox.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %to, "Outbox full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %to, "Outbox closed, dropping event");
                false
            }
        }
    }

    fn broadcast_except(&self, room: &str, sender: ConnectionId, event: &RelayEvent) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|member| **member != sender)
            .filter(|member| self.deliver(**member, event.clone()))
            .count()
    }

    /// Remove `connection_id` from its room, notifying the remaining members.
    fn leave_room(&mut self, connection_id: ConnectionId) -> Option<String> {
        let room = self.connections.get_mut(&connection_id)?.room.take()?;

        let now_empty = match self.rooms.get_mut(&room) {
            Some(members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.rooms.remove(&room);
            debug!(room = %room, "Room closed");
        } else {
            let event = RelayEvent::PeerLeft { room: room.clone() };
            self.broadcast_except(&room, connection_id, &event);
        }

        Some(room)
    }
}

/// Room registry shared by all connection tasks.
///
/// Thread-safe, cloneable. The only owner of room membership.
#[derive(Clone)]
pub struct SessionRelay {
    state: Arc<RwLock<RelayState>>,
    config: RelayConfig,
}

impl SessionRelay {
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(RelayState::default())),
            config,
        }
    }

    /// Register a new connection and hand back its outbox.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<RelayEvent>) {
        let connection_id = ConnectionId::new();
        let (outbox, rx) = mpsc::channel(self.config.outbox_capacity.max(1));

        self.state
            .write()
            .await
            .connections
            .insert(connection_id, ConnectionEntry { outbox, room: None });

        debug!(connection_id = %connection_id, "Connection registered");
        (connection_id, rx)
    }

    /// Put a connection into `room`, leaving any room it was in before.
    ///
    /// Other members receive `peer-joined`; the joiner receives `joined`.
    /// Returns the number of other members in the room.
    pub async fn join(&self, connection_id: ConnectionId, room: &str) -> Result<usize, JoinError> {
        if room.trim().is_empty() {
            return Err(JoinError::InvalidRoom);
        }

        let mut state = self.state.write().await;

        let current = state
            .connections
            .get(&connection_id)
            .ok_or(JoinError::UnknownConnection)?
            .room
            .clone();

        if current.as_deref() == Some(room) {
            let peers = state.rooms.get(room).map_or(0, |m| m.len().saturating_sub(1));
            state.deliver(
                connection_id,
                RelayEvent::Joined {
                    room: room.to_string(),
                    peers,
                },
            );
            return Ok(peers);
        }

        let occupancy = state.rooms.get(room).map_or(0, HashSet::len);
        if let Some(capacity) = self.config.room_capacity {
            if occupancy >= capacity {
                return Err(JoinError::RoomFull {
                    room: room.to_string(),
                    capacity,
                });
            }
        }

        state.leave_room(connection_id);

        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.room = Some(room.to_string());
        }

        let peers = state.broadcast_except(
            room,
            connection_id,
            &RelayEvent::PeerJoined {
                room: room.to_string(),
            },
        );
        state.deliver(
            connection_id,
            RelayEvent::Joined {
                room: room.to_string(),
                peers: occupancy,
            },
        );

        info!(
            connection_id = %connection_id,
            room = %room,
            members = occupancy + 1,
            notified = peers,
            "Joined room"
        );
        Ok(occupancy)
    }

    /// Forward `payload` to every other member of `room`.
    ///
    /// Missing rooms and non-member senders are dropped silently: joins and
    /// relays race during connection setup. Returns the number of deliveries.
    pub async fn relay(
        &self,
        connection_id: ConnectionId,
        room: &str,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> usize {
        let state = self.state.read().await;

        let is_member = state
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&connection_id));
        if !is_member {
            debug!(
                connection_id = %connection_id,
                room = %room,
                kind = ?kind,
                "Dropping relay from non-member"
            );
            return 0;
        }

        let event = RelayEvent::signal(kind, room.to_string(), payload);
        state.broadcast_except(room, connection_id, &event)
    }

    /// Remove a connection from its room. Returns the room it left, if any.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<String> {
        let left = self.state.write().await.leave_room(connection_id);
        if let Some(room) = &left {
            info!(connection_id = %connection_id, room = %room, "Left room");
        }
        left
    }

    /// Leave the current room and drop the connection's outbox.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        state.leave_room(connection_id);
        state.connections.remove(&connection_id);
        debug!(connection_id = %connection_id, "Connection removed");
    }

    /// Send an event to a single connection.
    pub async fn notify(&self, connection_id: ConnectionId, event: RelayEvent) -> bool {
        self.state.read().await.deliver(connection_id, event)
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for SessionRelay {
    fn default() -> Self {
        Self::new()
    }
}
