//! crates/mentorhub_core/src/notify.rs
//!
//! Notification Dispatcher: persists notification records and pushes them to
//! online recipients, suppressing the push when the recipient is already
//! viewing the conversation the notification refers to.
//!
//! Dedup policy: the record is always written. When the recipient has a live
//! session viewing the related route, the record is created already read and
//! no push event is sent, so history stays complete while unread counts and
//! popups stay quiet.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{
    NewNotification, Notification, NotificationKind, NotificationRef, NotificationStatus,
};
use crate::error::RealtimeResult;
use crate::events::ServerEvent;
use crate::ports::NotificationStore;
use crate::registry::ConnectionRegistry;

pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn NotificationStore>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn NotificationStore>) -> Self {
        Self { registry, store }
    }

    /// Persists a notification, then pushes it to the recipient's user room
    /// unless one of their sessions is actively viewing the related chat.
    pub async fn dispatch(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        sender_id: Uuid,
        related: NotificationRef,
        content: String,
        call_id: Option<Uuid>,
    ) -> RealtimeResult<Notification> {
        let viewing = match &related {
            NotificationRef::Chat(route) => self.registry.is_viewing(recipient_id, route).await,
            NotificationRef::Task(_) => false,
        };

        let status = if viewing {
            NotificationStatus::Read
        } else {
            NotificationStatus::Unread
        };

        // Persist before any push; a store failure means no event goes out.
        let notification = self
            .store
            .create(NewNotification {
                user_id: recipient_id,
                kind,
                content,
                related,
                sender_id,
                status,
                call_id,
            })
            .await?;

        if !viewing {
            self.registry
                .send_to_user(
                    recipient_id,
                    &ServerEvent::Notification {
                        notification: notification.clone(),
                    },
                )
                .await;
        }

        Ok(notification)
    }

    /// Server-initiated push for a task reminder, triggered by the task
    /// module over REST.
    pub async fn dispatch_task_reminder(
        &self,
        recipient_id: Uuid,
        task_id: Uuid,
        sender_id: Uuid,
        content: String,
    ) -> RealtimeResult<Notification> {
        let notification = self
            .store
            .create(NewNotification {
                user_id: recipient_id,
                kind: NotificationKind::TaskReminder,
                content,
                related: NotificationRef::Task(task_id),
                sender_id,
                status: NotificationStatus::Unread,
                call_id: None,
            })
            .await?;

        self.registry
            .send_to_user(
                recipient_id,
                &ServerEvent::TaskNotification {
                    notification: notification.clone(),
                },
            )
            .await;

        Ok(notification)
    }

    /// Rewrites the incoming-call notification for a ring cycle to a
    /// missed-call one; no second row is created.
    pub async fn update_to_missed(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        content: &str,
    ) -> RealtimeResult<()> {
        self.store.update_to_missed(user_id, call_id, content).await?;
        Ok(())
    }

    pub async fn mark_read(&self, notification_id: Uuid) -> RealtimeResult<()> {
        self.store.mark_read(notification_id).await?;
        Ok(())
    }

    pub async fn mark_read_by_kind(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
    ) -> RealtimeResult<()> {
        self.store.mark_read_by_kind(user_id, kind).await?;
        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> RealtimeResult<u64> {
        Ok(self.store.unread_count(user_id).await?)
    }

    pub async fn list(&self, user_id: Uuid) -> RealtimeResult<Vec<Notification>> {
        Ok(self.store.list(user_id).await?)
    }
}
