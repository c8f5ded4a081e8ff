//! crates/mentorhub_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the real-time core's external
//! collaborators. These traits form the boundary of the hexagonal
//! architecture: persistence of messages, contacts and notifications is
//! plain CRUD owned by other modules, consumed here through narrow ports.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ChatRoute, Contact, Message, NewMessage, NewNotification, Notification, NotificationKind,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Lookup of contact entries (mentor collaborations, peer connections,
/// group memberships) maintained by the contact CRUD module.
#[async_trait]
pub trait ContactService: Send + Sync {
    async fn find_contact_by_id(&self, contact_id: Uuid) -> PortResult<Contact>;

    /// Every contact a user participates in; used to derive the chat rooms
    /// a connection joins.
    async fn find_contacts_by_user_id(&self, user_id: Uuid) -> PortResult<Vec<Contact>>;

    /// All user ids participating in a conversation.
    async fn find_participants(&self, route: &ChatRoute) -> PortResult<Vec<Uuid>>;
}

/// Persistence of chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns the stored record. The store assigns
    /// the id and timestamp and promotes the status from pending to sent.
    async fn save_message(&self, message: NewMessage) -> PortResult<Message>;

    /// Marks every message on the route not sent by `reader_id` as read.
    /// Returns the number of messages that changed state.
    async fn mark_read(&self, route: &ChatRoute, reader_id: Uuid) -> PortResult<u64>;

    /// Unread messages on the route addressed to `user_id`.
    async fn count_unread(&self, route: &ChatRoute, user_id: Uuid) -> PortResult<u64>;

    /// Most recent messages on the route, oldest first.
    async fn history(&self, route: &ChatRoute, limit: u32) -> PortResult<Vec<Message>>;
}

/// Persistence of notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: NewNotification) -> PortResult<Notification>;

    /// Rewrites a previously-created incoming-call notification to a
    /// missed-call one in place; a single ring cycle produces one row.
    async fn update_to_missed(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        content: &str,
    ) -> PortResult<()>;

    async fn mark_read(&self, notification_id: Uuid) -> PortResult<()>;

    /// Marks every unread notification of the given kind for the user.
    async fn mark_read_by_kind(&self, user_id: Uuid, kind: NotificationKind) -> PortResult<()>;

    async fn unread_count(&self, user_id: Uuid) -> PortResult<u64>;

    async fn list(&self, user_id: Uuid) -> PortResult<Vec<Notification>>;
}

/// Validation of browser auth sessions. Session issuance lives in the
/// out-of-scope auth module; the gateway only verifies.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn validate_session(&self, session_id: &str) -> PortResult<Uuid>;
}
