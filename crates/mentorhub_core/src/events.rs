//! crates/mentorhub_core/src/events.rs
//!
//! The closed set of events the server pushes to clients. Tag names match
//! the event names the existing web client already listens for.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CallEndReason, CallKind, ChatRoute, Message, Notification};

/// Everything the server can emit onto a client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    // --- Chat ---
    NewMessage {
        message: Message,
    },
    Typing {
        user_id: Uuid,
        chat_route: ChatRoute,
    },
    StopTyping {
        user_id: Uuid,
        chat_route: ChatRoute,
    },
    MessagesRead {
        reader_id: Uuid,
        chat_route: ChatRoute,
    },

    // --- 1:1 call signaling ---
    CallOffer {
        call_id: Uuid,
        caller_id: Uuid,
        chat_route: ChatRoute,
        call_type: CallKind,
        sdp: String,
    },
    CallAnswer {
        call_id: Uuid,
        chat_route: ChatRoute,
        sdp: String,
    },
    IceCandidate {
        sender_id: Uuid,
        chat_route: ChatRoute,
        candidate: String,
    },
    CallEnded {
        call_id: Uuid,
        chat_route: ChatRoute,
        reason: CallEndReason,
    },

    // --- Group call signaling (pairwise mesh negotiation) ---
    GroupOffer {
        sender_id: Uuid,
        group_id: Uuid,
        call_type: CallKind,
        sdp: String,
    },
    GroupAnswer {
        sender_id: Uuid,
        group_id: Uuid,
        sdp: String,
    },
    GroupIceCandidate {
        sender_id: Uuid,
        group_id: Uuid,
        candidate: String,
    },
    GroupCallJoined {
        group_id: Uuid,
        call_id: Uuid,
        user_id: Uuid,
        call_type: CallKind,
    },
    GroupCallLeft {
        group_id: Uuid,
        call_id: Uuid,
        user_id: Uuid,
    },
    GroupCallEnded {
        group_id: Uuid,
        call_id: Uuid,
    },
    /// Reply to a late joiner's lookup of an in-progress call.
    GroupCallInfo {
        group_id: Uuid,
        call_id: Option<Uuid>,
        call_type: Option<CallKind>,
    },

    // --- Notifications ---
    Notification {
        notification: Notification,
    },
    /// Server-initiated push for a task reminder.
    TaskNotification {
        notification: Notification,
    },

    /// Transient error surfaced only to the originating connection.
    Error {
        message: String,
    },
}
