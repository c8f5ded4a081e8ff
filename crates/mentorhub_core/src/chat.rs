//! crates/mentorhub_core/src/chat.rs
//!
//! Chat Router: resolves abstract chat targets to routes and delivers
//! messages, typing indicators, and read receipts to the right rooms.
//!
//! Side-effect order for sends is fixed: persist, then broadcast, then
//! notify. A store failure aborts the broadcast so a client reload always
//! sees at least what was broadcast.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    ChatRoute, ChatTarget, ContentType, FileMetadata, Message, NewMessage, NotificationKind,
    NotificationRef,
};
use crate::error::{RealtimeError, RealtimeResult};
use crate::events::ServerEvent;
use crate::notify::NotificationDispatcher;
use crate::ports::{ContactService, MessageStore};
use crate::registry::{ConnectionId, ConnectionRegistry, RoomId};

/// How much of a text message survives into the notification preview.
const PREVIEW_LEN: usize = 80;

pub struct ChatRouter {
    registry: Arc<ConnectionRegistry>,
    contacts: Arc<dyn ContactService>,
    messages: Arc<dyn MessageStore>,
    notifier: Arc<NotificationDispatcher>,
}

impl ChatRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        contacts: Arc<dyn ContactService>,
        messages: Arc<dyn MessageStore>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            registry,
            contacts,
            messages,
            notifier,
        }
    }

    /// Computes the conversation route for a target: explicit type+id maps
    /// directly, a contact id goes through the contact store.
    pub async fn resolve_route(&self, target: &ChatTarget) -> RealtimeResult<ChatRoute> {
        match target {
            ChatTarget::Group(id) => Ok(ChatRoute::Group(*id)),
            ChatTarget::Collaboration(id) => Ok(ChatRoute::Collaboration(*id)),
            ChatTarget::Connection(id) => Ok(ChatRoute::Connection(*id)),
            ChatTarget::Contact(id) => Ok(self.contacts.find_contact_by_id(*id).await?.route),
        }
    }

    /// Subscribes a connection to one room per conversation the user
    /// participates in. Returns how many rooms were joined.
    pub async fn join_chats(
        &self,
        connection: ConnectionId,
        user_id: Uuid,
    ) -> RealtimeResult<usize> {
        let contacts = self.contacts.find_contacts_by_user_id(user_id).await?;
        let routes: Vec<ChatRoute> = contacts.into_iter().map(|c| c.route).collect();
        self.registry.join_chat_rooms(connection, &routes).await;
        Ok(routes.len())
    }

    /// Persists a message, broadcasts it to the conversation room, and
    /// notifies every participant who is not actively viewing the chat.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        target: &ChatTarget,
        content: Option<String>,
        content_type: ContentType,
        file: Option<FileMetadata>,
    ) -> RealtimeResult<Message> {
        let content = content.unwrap_or_default();
        if content.trim().is_empty() && file.is_none() {
            return Err(RealtimeError::Validation(
                "message needs text content or a file".into(),
            ));
        }

        let route = self.resolve_route(target).await?;

        // Persist before broadcast; a failed save never reaches the room.
        let message = self
            .messages
            .save_message(NewMessage {
                sender_id,
                chat_route: route.clone(),
                content,
                content_type,
                file,
            })
            .await?;

        self.registry
            .send_to_room(
                &RoomId::Chat(route.clone()),
                &ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        // Notification fan-out is best-effort once the message is durable.
        match self.contacts.find_participants(&route).await {
            Ok(participants) => {
                let preview = preview(&message);
                for recipient in participants.into_iter().filter(|p| *p != sender_id) {
                    if let Err(error) = self
                        .notifier
                        .dispatch(
                            recipient,
                            NotificationKind::Message,
                            sender_id,
                            NotificationRef::Chat(route.clone()),
                            preview.clone(),
                            None,
                        )
                        .await
                    {
                        warn!(%route, %recipient, %error, "failed to dispatch message notification");
                    }
                }
            }
            Err(error) => {
                warn!(%route, %error, "participant lookup failed, skipping notifications")
            }
        }

        Ok(message)
    }

    /// Broadcast-only, fire-and-forget, no persistence.
    pub async fn typing(&self, user_id: Uuid, target: &ChatTarget) -> RealtimeResult<()> {
        let route = self.resolve_route(target).await?;
        self.registry
            .send_to_room(
                &RoomId::Chat(route.clone()),
                &ServerEvent::Typing {
                    user_id,
                    chat_route: route,
                },
            )
            .await;
        Ok(())
    }

    pub async fn stop_typing(&self, user_id: Uuid, target: &ChatTarget) -> RealtimeResult<()> {
        let route = self.resolve_route(target).await?;
        self.registry
            .send_to_room(
                &RoomId::Chat(route.clone()),
                &ServerEvent::StopTyping {
                    user_id,
                    chat_route: route,
                },
            )
            .await;
        Ok(())
    }

    /// Marks the route's messages read for the reader and rebroadcasts a
    /// read receipt. Re-marking an already-read route changes nothing and
    /// broadcasts nothing.
    pub async fn mark_as_read(&self, user_id: Uuid, target: &ChatTarget) -> RealtimeResult<()> {
        let route = self.resolve_route(target).await?;
        let changed = self.messages.mark_read(&route, user_id).await?;
        if changed > 0 {
            self.registry
                .send_to_room(
                    &RoomId::Chat(route.clone()),
                    &ServerEvent::MessagesRead {
                        reader_id: user_id,
                        chat_route: route,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Sets or clears the Active Chat Marker for a connection.
    pub async fn set_active_chat(
        &self,
        connection: ConnectionId,
        target: Option<&ChatTarget>,
    ) -> RealtimeResult<()> {
        let route = match target {
            Some(target) => Some(self.resolve_route(target).await?),
            None => None,
        };
        self.registry.set_active_chat(connection, route).await;
        Ok(())
    }
}

fn preview(message: &Message) -> String {
    match message.content_type {
        ContentType::File => "Sent a file".to_string(),
        ContentType::Text => {
            let mut preview = message.content.clone();
            if preview.len() > PREVIEW_LEN {
                let cut = preview
                    .char_indices()
                    .map(|(i, _)| i)
                    .take_while(|i| *i <= PREVIEW_LEN)
                    .last()
                    .unwrap_or(0);
                preview.truncate(cut);
            }
            preview
        }
    }
}
