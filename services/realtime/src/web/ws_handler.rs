//! services/realtime/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! It registers the connection, pumps outbound events from the registry's
//! channel, dispatches inbound client messages to the coordinators, and
//! fans disconnect out to every coordinator's offline hook.

use crate::web::{protocol::ClientMessage, state::AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use mentorhub_core::error::{RealtimeError, RealtimeResult};
use mentorhub_core::events::ServerEvent;
use mentorhub_core::registry::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>, // from auth middleware
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New WebSocket connection established for user: {}", user_id);

    let (mut ws_sender, mut receiver) = socket.split();

    // The registry hands us events on this channel; one writer task drains
    // it so outbound frames keep arrival order.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection = app_state.registry.connect(event_tx).await;

    let writer_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server event: {:?}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // --- Main Message Loop ---
    loop {
        if let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_message(text.to_string(), &app_state, connection, user_id).await;
                }
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        } else {
            info!("Client disconnected.");
            break;
        }
    }

    // --- Cleanup ---
    writer_task.abort();
    if let Some(disconnect) = app_state.registry.disconnect(connection).await {
        // Presence-offline side effects only fire once the user's last
        // session is gone; each coordinator's hook is idempotent.
        if disconnect.last_session {
            if let Some(user_id) = disconnect.user_id {
                app_state.calls.on_user_offline(user_id).await;
                app_state.group_calls.on_user_offline(user_id).await;
            }
        }
    }
    info!("WebSocket connection closed.");
}

/// Helper function to handle the logic for different `ClientMessage` variants.
/// Errors are surfaced to the originating connection only and never tear the
/// connection down.
async fn handle_text_message(
    text: String,
    app_state: &Arc<AppState>,
    connection: ConnectionId,
    authenticated_user: Uuid,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            app_state
                .registry
                .send_to_connection(
                    connection,
                    &ServerEvent::Error {
                        message: format!("Malformed message: {}", e),
                    },
                )
                .await;
            return;
        }
    };

    let result = dispatch(client_msg, app_state, connection, authenticated_user).await;
    if let Err(error) = result {
        warn!(connection = %connection, %error, "handler rejected client message");
        app_state
            .registry
            .send_to_connection(
                connection,
                &ServerEvent::Error {
                    message: error.to_string(),
                },
            )
            .await;
    }
}

/// A client may only act as the user it authenticated as.
fn ensure_self(claimed: Uuid, authenticated: Uuid) -> RealtimeResult<()> {
    if claimed == authenticated {
        Ok(())
    } else {
        Err(RealtimeError::Validation(
            "payload user does not match the authenticated user".into(),
        ))
    }
}

async fn dispatch(
    msg: ClientMessage,
    app: &Arc<AppState>,
    connection: ConnectionId,
    authed: Uuid,
) -> RealtimeResult<()> {
    match msg {
        ClientMessage::JoinUserRoom { user_id } => {
            ensure_self(user_id, authed)?;
            app.registry.join_user_room(connection, user_id).await;
            Ok(())
        }
        ClientMessage::JoinChats { user_id } => {
            ensure_self(user_id, authed)?;
            let joined = app.chat.join_chats(connection, user_id).await?;
            info!(%user_id, joined, "connection joined chat rooms");
            Ok(())
        }
        ClientMessage::ActiveChat { user_id, target } => {
            ensure_self(user_id, authed)?;
            app.chat.set_active_chat(connection, target.as_ref()).await
        }
        ClientMessage::SendMessage {
            sender_id,
            target,
            content,
            content_type,
            file,
        } => {
            ensure_self(sender_id, authed)?;
            app.chat
                .send_message(sender_id, &target, content, content_type, file)
                .await?;
            Ok(())
        }
        ClientMessage::Typing { user_id, target } => {
            ensure_self(user_id, authed)?;
            app.chat.typing(user_id, &target).await
        }
        ClientMessage::StopTyping { user_id, target } => {
            ensure_self(user_id, authed)?;
            app.chat.stop_typing(user_id, &target).await
        }
        ClientMessage::MarkAsRead { user_id, target } => {
            ensure_self(user_id, authed)?;
            app.chat.mark_as_read(user_id, &target).await
        }

        ClientMessage::CallOffer {
            caller_id,
            recipient_id,
            target,
            call_type,
            sdp,
        } => {
            ensure_self(caller_id, authed)?;
            let route = app.chat.resolve_route(&target).await?;
            app.calls
                .offer(caller_id, recipient_id, route, call_type, sdp)
                .await?;
            Ok(())
        }
        ClientMessage::CallAnswer { user_id, target, sdp } => {
            ensure_self(user_id, authed)?;
            let route = app.chat.resolve_route(&target).await?;
            app.calls.answer(&route, user_id, sdp).await
        }
        ClientMessage::IceCandidate {
            sender_id,
            recipient_id,
            target,
            candidate,
        } => {
            ensure_self(sender_id, authed)?;
            let route = app.chat.resolve_route(&target).await?;
            app.calls
                .ice_candidate(sender_id, recipient_id, &route, candidate)
                .await;
            Ok(())
        }
        ClientMessage::CallEnded { user_id, target } => {
            ensure_self(user_id, authed)?;
            let route = app.chat.resolve_route(&target).await?;
            app.calls.end_call(&route, user_id).await
        }

        ClientMessage::GroupOffer {
            sender_id,
            recipient_id,
            group_id,
            call_type,
            sdp,
        } => {
            ensure_self(sender_id, authed)?;
            app.group_calls
                .offer(sender_id, recipient_id, group_id, call_type, sdp)
                .await;
            Ok(())
        }
        ClientMessage::GroupAnswer {
            sender_id,
            recipient_id,
            group_id,
            sdp,
        } => {
            ensure_self(sender_id, authed)?;
            app.group_calls
                .answer(sender_id, recipient_id, group_id, sdp)
                .await;
            Ok(())
        }
        ClientMessage::GroupIceCandidate {
            sender_id,
            recipient_id,
            group_id,
            candidate,
        } => {
            ensure_self(sender_id, authed)?;
            app.group_calls
                .ice_candidate(sender_id, recipient_id, group_id, candidate)
                .await;
            Ok(())
        }
        ClientMessage::JoinGroupCall {
            user_id,
            group_id,
            call_type,
            call_id,
        } => {
            ensure_self(user_id, authed)?;
            app.group_calls
                .join(user_id, group_id, call_type, call_id)
                .await
        }
        ClientMessage::LeaveGroupCall { user_id, group_id } => {
            ensure_self(user_id, authed)?;
            app.group_calls.leave(user_id, group_id).await;
            Ok(())
        }
        ClientMessage::GroupCallEnded { user_id, group_id } => {
            ensure_self(user_id, authed)?;
            app.group_calls.end_for(user_id, group_id).await;
            Ok(())
        }
        ClientMessage::GetGroupCall { group_id } => {
            let (call_id, call_type) = app.group_calls.call_info(group_id).await;
            app.registry
                .send_to_connection(
                    connection,
                    &ServerEvent::GroupCallInfo {
                        group_id,
                        call_id,
                        call_type,
                    },
                )
                .await;
            Ok(())
        }

        ClientMessage::NotificationRead {
            notification_id,
            kind,
        } => match (notification_id, kind) {
            (Some(id), _) => app.notifier.mark_read(id).await,
            (None, Some(kind)) => app.notifier.mark_read_by_kind(authed, kind).await,
            (None, None) => Err(RealtimeError::Validation(
                "notification-read needs a notification id or a kind".into(),
            )),
        },
    }
}
