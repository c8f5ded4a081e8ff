//! crates/mentorhub_core/src/registry.rs
//!
//! Connection Registry: tracks which user is on which live connection and
//! which rooms each connection has joined.
//!
//! The registry maintains bidirectional mappings (room -> connections for
//! broadcast, connection -> rooms for cleanup) plus a user -> connections
//! index for per-user delivery. A user may hold several concurrent
//! connections (multi-device); all of them receive events addressed to the
//! user's room.
//!
//! All maps live behind a single mutex. Mutations and broadcasts complete
//! while the lock is held and never await external I/O, so events pushed to
//! a room reach every member in send order and no handler can observe a
//! half-applied transition.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ChatRoute;
use crate::events::ServerEvent;

/// Unique identifier for one live connection, generated server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pub/sub channel the transport broadcasts into: either a per-user room
/// or a per-conversation room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    User(Uuid),
    Chat(ChatRoute),
}

/// One live connection: its outbound channel, the user it authenticated as
/// (set when the user room is joined), the rooms it subscribed to, and the
/// conversation its UI is currently viewing, if any.
struct ConnectionEntry {
    user_id: Option<Uuid>,
    sender: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<RoomId>,
    active_chat: Option<ChatRoute>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    user_connections: HashMap<Uuid, HashSet<ConnectionId>>,
}

/// What `disconnect` tells the caller, so presence-offline side effects can
/// fan out to the other coordinators.
#[derive(Debug)]
pub struct DisconnectInfo {
    pub user_id: Option<Uuid>,
    /// True when no other connection remains for the user.
    pub last_session: bool,
}

/// Registry of live connections and room subscriptions.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new ephemeral session and returns its id. The sender is
    /// the connection's outbound event channel, drained by the transport's
    /// writer task.
    pub async fn connect(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId::new();
        let mut inner = self.inner.lock().await;
        inner.connections.insert(
            id,
            ConnectionEntry {
                user_id: None,
                sender,
                rooms: HashSet::new(),
                active_chat: None,
            },
        );
        debug!(connection = %id, "connection registered");
        id
    }

    /// Subscribes the connection to the per-user broadcast room and records
    /// which user owns it. Idempotent; must happen before any user-targeted
    /// event is meaningful.
    pub async fn join_user_room(&self, connection: ConnectionId, user_id: Uuid) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.connections.get_mut(&connection) else {
            warn!(connection = %connection, "join-user-room for unknown connection, ignoring");
            return;
        };
        entry.user_id = Some(user_id);
        entry.rooms.insert(RoomId::User(user_id));
        inner
            .rooms
            .entry(RoomId::User(user_id))
            .or_default()
            .insert(connection);
        inner
            .user_connections
            .entry(user_id)
            .or_default()
            .insert(connection);
    }

    /// Subscribes the connection to one room per conversation the user
    /// participates in. Unknown connections are logged and ignored, never
    /// fatal.
    pub async fn join_chat_rooms(&self, connection: ConnectionId, routes: &[ChatRoute]) {
        let mut inner = self.inner.lock().await;
        if !inner.connections.contains_key(&connection) {
            warn!(connection = %connection, "join-chats for unknown connection, ignoring");
            return;
        }
        for route in routes {
            let room = RoomId::Chat(route.clone());
            inner.rooms.entry(room.clone()).or_default().insert(connection);
            if let Some(entry) = inner.connections.get_mut(&connection) {
                entry.rooms.insert(room);
            }
        }
    }

    /// Records which conversation the connection's UI is viewing; `None`
    /// clears the marker (the user navigated away).
    pub async fn set_active_chat(&self, connection: ConnectionId, route: Option<ChatRoute>) {
        let mut inner = self.inner.lock().await;
        match inner.connections.get_mut(&connection) {
            Some(entry) => entry.active_chat = route,
            None => warn!(connection = %connection, "active-chat for unknown connection, ignoring"),
        }
    }

    /// True if any of the user's live connections is viewing the route.
    pub async fn is_viewing(&self, user_id: Uuid, route: &ChatRoute) -> bool {
        let inner = self.inner.lock().await;
        let Some(connections) = inner.user_connections.get(&user_id) else {
            return false;
        };
        connections.iter().any(|id| {
            inner
                .connections
                .get(id)
                .is_some_and(|entry| entry.active_chat.as_ref() == Some(route))
        })
    }

    /// True if the user has at least one live connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        inner
            .user_connections
            .get(&user_id)
            .is_some_and(|c| !c.is_empty())
    }

    /// Delivers an event to every member of a room, in send order. Returns
    /// how many connections it was handed to. Send failures mean the
    /// connection's writer task already died; cleanup happens on disconnect.
    pub async fn send_to_room(&self, room: &RoomId, event: &ServerEvent) -> usize {
        let inner = self.inner.lock().await;
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for id in members {
            if let Some(entry) = inner.connections.get(id) {
                if entry.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Delivers an event to every live connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        self.send_to_room(&RoomId::User(user_id), event).await
    }

    /// Delivers an event to a single connection (error feedback path).
    pub async fn send_to_connection(&self, connection: ConnectionId, event: &ServerEvent) {
        let inner = self.inner.lock().await;
        if let Some(entry) = inner.connections.get(&connection) {
            let _ = entry.sender.send(event.clone());
        }
    }

    /// Removes the connection from every room and drops its session state.
    /// Tells the caller whether this was the user's last session so
    /// presence-offline side effects can run.
    pub async fn disconnect(&self, connection: ConnectionId) -> Option<DisconnectInfo> {
        let mut inner = self.inner.lock().await;
        let entry = inner.connections.remove(&connection)?;

        for room in &entry.rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&connection);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }

        let mut last_session = false;
        if let Some(user_id) = entry.user_id {
            if let Some(connections) = inner.user_connections.get_mut(&user_id) {
                connections.remove(&connection);
                if connections.is_empty() {
                    inner.user_connections.remove(&user_id);
                    last_session = true;
                }
            }
        }

        debug!(connection = %connection, last_session, "connection removed");
        Some(DisconnectInfo {
            user_id: entry.user_id,
            last_session,
        })
    }
}
