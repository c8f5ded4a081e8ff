//! services/realtime/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification. The REST surface is the
//! catch-up path: clients fetch history and notification state here, then
//! stay current over the WebSocket.

use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use mentorhub_core::domain::{ChatTarget, NotificationKind};
use mentorhub_core::error::RealtimeError;
use mentorhub_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        message_history_handler,
        list_notifications_handler,
        unread_count_handler,
        notifications_read_handler,
        task_reminder_handler,
    ),
    components(
        schemas(UnreadCountResponse, NotificationsReadRequest, TaskReminderRequest)
    ),
    tags(
        (name = "Realtime Gateway API", description = "Catch-up endpoints for chat history and notifications.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

/// Identifies a conversation in query-string form.
#[derive(Deserialize, Debug)]
pub struct ChatQuery {
    kind: String,
    id: Uuid,
    #[serde(default)]
    limit: Option<u32>,
}

impl ChatQuery {
    fn target(&self) -> Result<ChatTarget, (StatusCode, String)> {
        match self.kind.as_str() {
            "group" => Ok(ChatTarget::Group(self.id)),
            "user-mentor" => Ok(ChatTarget::Collaboration(self.id)),
            "user-user" => Ok(ChatTarget::Connection(self.id)),
            "contact" => Ok(ChatTarget::Contact(self.id)),
            other => Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown chat kind: '{}'", other),
            )),
        }
    }
}

/// The number of unread notifications for the authenticated user.
#[derive(Serialize, ToSchema)]
pub struct UnreadCountResponse {
    unread: u64,
}

/// Acknowledge notifications: a single one by id, or every one of a kind.
#[derive(Deserialize, ToSchema)]
pub struct NotificationsReadRequest {
    #[serde(default)]
    notification_id: Option<Uuid>,
    #[serde(default)]
    kind: Option<NotificationKind>,
}

/// Internal trigger from the task module: deliver a reminder for a task.
#[derive(Deserialize, ToSchema)]
pub struct TaskReminderRequest {
    recipient_id: Uuid,
    task_id: Uuid,
    sender_id: Uuid,
    content: String,
}

fn internal_error(context: &str, e: impl std::fmt::Debug) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
}

fn core_error(context: &str, e: RealtimeError) -> (StatusCode, String) {
    match e {
        RealtimeError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        RealtimeError::Port(PortError::NotFound(what)) => {
            (StatusCode::NOT_FOUND, format!("{} not found", what))
        }
        other => internal_error(context, other),
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up")
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Fetch recent messages for a conversation, oldest first.
#[utoipa::path(
    get,
    path = "/messages",
    params(
        ("kind" = String, Query, description = "Conversation kind: group, user-mentor, user-user or contact."),
        ("id" = Uuid, Query, description = "Conversation (or contact) id."),
        ("limit" = Option<u32>, Query, description = "Maximum messages to return (default 50, cap 200).")
    ),
    responses(
        (status = 200, description = "Messages on the conversation, oldest first"),
        (status = 400, description = "Unknown conversation kind"),
        (status = 404, description = "Contact not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn message_history_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let target = query.target()?;
    let route = app_state
        .chat
        .resolve_route(&target)
        .await
        .map_err(|e| core_error("Failed to resolve conversation", e))?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let messages = app_state
        .messages
        .history(&route, limit)
        .await
        .map_err(|e| internal_error("Failed to load message history", e))?;
    Ok(Json(messages))
}

/// List the authenticated user's notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "The user's notifications, newest first"),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_notifications_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let notifications = app_state
        .notifier
        .list(user_id)
        .await
        .map_err(|e| core_error("Failed to list notifications", e))?;
    Ok(Json(notifications))
}

/// Count the authenticated user's unread notifications.
#[utoipa::path(
    get,
    path = "/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn unread_count_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let unread = app_state
        .notifier
        .unread_count(user_id)
        .await
        .map_err(|e| core_error("Failed to count notifications", e))?;
    Ok(Json(UnreadCountResponse { unread }))
}

/// Mark notifications as read, by id or by kind.
#[utoipa::path(
    post,
    path = "/notifications/read",
    request_body = NotificationsReadRequest,
    responses(
        (status = 204, description = "Notifications marked read"),
        (status = 400, description = "Neither an id nor a kind supplied"),
        (status = 404, description = "Notification not found"),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn notifications_read_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<NotificationsReadRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let result = match (payload.notification_id, payload.kind) {
        (Some(id), _) => app_state.notifier.mark_read(id).await,
        (None, Some(kind)) => app_state.notifier.mark_read_by_kind(user_id, kind).await,
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Request must include a notification_id or a kind".to_string(),
            ))
        }
    };
    result.map_err(|e| core_error("Failed to mark notifications read", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deliver a task reminder notification. Called by the platform's task
/// module, not by browsers.
#[utoipa::path(
    post,
    path = "/tasks/reminders",
    request_body = TaskReminderRequest,
    responses(
        (status = 201, description = "Reminder recorded and pushed if the recipient is online"),
        (status = 401, description = "Missing or invalid session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn task_reminder_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TaskReminderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let notification = app_state
        .notifier
        .dispatch_task_reminder(
            payload.recipient_id,
            payload.task_id,
            payload.sender_id,
            payload.content,
        )
        .await
        .map_err(|e| core_error("Failed to dispatch task reminder", e))?;
    Ok((StatusCode::CREATED, Json(notification)))
}
