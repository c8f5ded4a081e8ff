//! services/realtime/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! realtime gateway. Tag names match the event names the deployed client
//! already emits.
//!
//! Server-to-client events are the core's `ServerEvent` type, serialized
//! as-is; this module only owns the client-to-server side.

use mentorhub_core::domain::{CallKind, ChatTarget, ContentType, FileMetadata, NotificationKind};
use serde::Deserialize;
use uuid::Uuid;

fn default_content_type() -> ContentType {
    ContentType::Text
}

/// Represents the structured messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Subscribe this connection to one room per conversation the user
    /// participates in.
    JoinChats { user_id: Uuid },

    /// Subscribe this connection to the user's own broadcast room. Must
    /// precede any user-targeted event.
    JoinUserRoom { user_id: Uuid },

    /// Declare which conversation the UI is showing; `None` on navigation
    /// away. Drives notification dedup.
    ActiveChat {
        user_id: Uuid,
        #[serde(default)]
        target: Option<ChatTarget>,
    },

    SendMessage {
        sender_id: Uuid,
        target: ChatTarget,
        #[serde(default)]
        content: Option<String>,
        #[serde(default = "default_content_type")]
        content_type: ContentType,
        #[serde(default)]
        file: Option<FileMetadata>,
    },

    Typing {
        user_id: Uuid,
        target: ChatTarget,
    },
    StopTyping {
        user_id: Uuid,
        target: ChatTarget,
    },
    MarkAsRead {
        user_id: Uuid,
        target: ChatTarget,
    },

    // --- 1:1 call signaling ---
    CallOffer {
        caller_id: Uuid,
        recipient_id: Uuid,
        target: ChatTarget,
        call_type: CallKind,
        sdp: String,
    },
    CallAnswer {
        user_id: Uuid,
        target: ChatTarget,
        sdp: String,
    },
    IceCandidate {
        sender_id: Uuid,
        recipient_id: Uuid,
        target: ChatTarget,
        candidate: String,
    },
    CallEnded {
        user_id: Uuid,
        target: ChatTarget,
    },

    // --- Group call signaling ---
    GroupOffer {
        sender_id: Uuid,
        recipient_id: Uuid,
        group_id: Uuid,
        call_type: CallKind,
        sdp: String,
    },
    GroupAnswer {
        sender_id: Uuid,
        recipient_id: Uuid,
        group_id: Uuid,
        sdp: String,
    },
    GroupIceCandidate {
        sender_id: Uuid,
        recipient_id: Uuid,
        group_id: Uuid,
        candidate: String,
    },
    JoinGroupCall {
        user_id: Uuid,
        group_id: Uuid,
        call_type: CallKind,
        call_id: Uuid,
    },
    LeaveGroupCall {
        user_id: Uuid,
        group_id: Uuid,
    },
    GroupCallEnded {
        user_id: Uuid,
        group_id: Uuid,
    },
    /// Late-joiner lookup of an in-progress group call.
    GetGroupCall { group_id: Uuid },

    /// Acknowledge notifications: a single one by id, or every one of a
    /// kind for the user.
    NotificationRead {
        #[serde(default)]
        notification_id: Option<Uuid>,
        #[serde(default)]
        kind: Option<NotificationKind>,
    },
}
