//! crates/mentorhub_core/src/domain.rs
//!
//! Defines the pure, core data structures for the real-time layer.
//! These structs are independent of any database or transport, but carry
//! serde derives because they travel inside server events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Chat Routing
//=========================================================================================

/// Derived key identifying a single conversation. A contact record maps 1:1
/// to exactly one route; the route is never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum ChatRoute {
    /// A group conversation, keyed by group id.
    Group(Uuid),
    /// A user-mentor conversation, keyed by collaboration id.
    #[serde(rename = "user-mentor")]
    Collaboration(Uuid),
    /// A peer-to-peer conversation, keyed by user-connection id.
    #[serde(rename = "user-user")]
    Connection(Uuid),
}

impl ChatRoute {
    /// The stable string form used as a room name, e.g. `user-mentor_abc...`.
    pub fn room_key(&self) -> String {
        match self {
            ChatRoute::Group(id) => format!("group_{id}"),
            ChatRoute::Collaboration(id) => format!("user-mentor_{id}"),
            ChatRoute::Connection(id) => format!("user-user_{id}"),
        }
    }
}

impl std::fmt::Display for ChatRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.room_key())
    }
}

/// An abstract chat target as supplied by the client: either explicit
/// type+id fields, or a contact id the router resolves through the
/// contact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum ChatTarget {
    Group(Uuid),
    #[serde(rename = "user-mentor")]
    Collaboration(Uuid),
    #[serde(rename = "user-user")]
    Connection(Uuid),
    /// Resolved via `ContactService::find_contact_by_id`.
    Contact(Uuid),
}

/// A contact entry as returned by the external contact collaborator.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: Uuid,
    pub route: ChatRoute,
    /// All user ids participating in the conversation (both sides of a 1:1,
    /// every member of a group).
    pub member_ids: Vec<Uuid>,
}

//=========================================================================================
// Messages
//=========================================================================================

/// Delivery status of a message. Monotonic: pending -> sent -> read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    File,
}

/// Metadata for a file or media attachment. The upload itself is handled by
/// an external collaborator; the router only carries the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// A chat message as persisted by the external message store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub chat_route: ChatRoute,
    pub content: String,
    pub content_type: ContentType,
    pub file: Option<FileMetadata>,
    pub is_read: bool,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
}

/// The fields the router supplies when persisting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub chat_route: ChatRoute,
    pub content: String,
    pub content_type: ContentType,
    pub file: Option<FileMetadata>,
}

//=========================================================================================
// Calls
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

/// Why a 1:1 call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEndReason {
    /// Ended by either party after being answered, or declined mid-ring.
    Ended,
    /// The ring timeout elapsed with no answer.
    Missed,
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    IncomingCall,
    MissedCall,
    TaskReminder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

/// What a notification refers back to: a conversation or a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NotificationRef {
    Chat(ChatRoute),
    Task(Uuid),
}

/// A durable notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub content: String,
    pub related: NotificationRef,
    pub sender_id: Uuid,
    pub status: NotificationStatus,
    pub call_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The fields the dispatcher supplies when persisting a new notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub content: String,
    pub related: NotificationRef,
    pub sender_id: Uuid,
    pub status: NotificationStatus,
    pub call_id: Option<Uuid>,
}
