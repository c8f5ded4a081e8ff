//! crates/mentorhub_core/src/lib.rs
//!
//! Core of the mentoring platform's real-time layer: domain types, service
//! ports, and the coordinators that route chat, call signaling, and
//! notifications over live connections. Transport and persistence live in
//! the `realtime` service.

pub mod call;
pub mod chat;
pub mod domain;
pub mod error;
pub mod events;
pub mod group_call;
pub mod notify;
pub mod ports;
pub mod registry;

#[cfg(test)]
mod testing;

pub use call::CallCoordinator;
pub use chat::ChatRouter;
pub use domain::{
    CallEndReason, CallKind, ChatRoute, ChatTarget, Contact, ContentType, FileMetadata, Message,
    MessageStatus, NewMessage, NewNotification, Notification, NotificationKind, NotificationRef,
    NotificationStatus,
};
pub use error::{RealtimeError, RealtimeResult};
pub use events::ServerEvent;
pub use group_call::GroupCallCoordinator;
pub use notify::NotificationDispatcher;
pub use ports::{
    AuthService, ContactService, MessageStore, NotificationStore, PortError, PortResult,
};
pub use registry::{ConnectionId, ConnectionRegistry, DisconnectInfo, RoomId};
