//! crates/mentorhub_core/src/testing.rs
//!
//! In-memory mock implementations of the service ports, shared by the
//! coordinator test modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::{
    ChatRoute, Contact, Message, MessageStatus, NewMessage, NewNotification, Notification,
    NotificationKind, NotificationStatus,
};
use crate::ports::{ContactService, MessageStore, NotificationStore, PortError, PortResult};

//=========================================================================================
// Contacts
//=========================================================================================

#[derive(Default)]
pub struct MockContacts {
    contacts: Mutex<Vec<Contact>>,
}

impl MockContacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contact and returns its id.
    pub fn add_contact(&self, route: ChatRoute, member_ids: Vec<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.contacts.lock().unwrap().push(Contact {
            id,
            route,
            member_ids,
        });
        id
    }
}

#[async_trait]
impl ContactService for MockContacts {
    async fn find_contact_by_id(&self, contact_id: Uuid) -> PortResult<Contact> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == contact_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Contact {contact_id} not found")))
    }

    async fn find_contacts_by_user_id(&self, user_id: Uuid) -> PortResult<Vec<Contact>> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.member_ids.contains(&user_id))
            .cloned()
            .collect())
    }

    async fn find_participants(&self, route: &ChatRoute) -> PortResult<Vec<Uuid>> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.route == route)
            .map(|c| c.member_ids.clone())
            .ok_or_else(|| PortError::NotFound(format!("No contact for route {route}")))
    }
}

//=========================================================================================
// Messages
//=========================================================================================

#[derive(Default)]
pub struct MockMessages {
    messages: Mutex<Vec<Message>>,
    fail_saves: AtomicBool,
}

impl MockMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save_message` fail, simulating an unavailable
    /// store.
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for MockMessages {
    async fn save_message(&self, message: NewMessage) -> PortResult<Message> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("message store unavailable".into()));
        }
        let stored = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            chat_route: message.chat_route,
            content: message.content,
            content_type: message.content_type,
            file: message.file,
            is_read: false,
            status: MessageStatus::Sent,
            timestamp: Utc::now(),
        };
        self.messages.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn mark_read(&self, route: &ChatRoute, reader_id: Uuid) -> PortResult<u64> {
        let mut messages = self.messages.lock().unwrap();
        let mut changed = 0;
        for message in messages
            .iter_mut()
            .filter(|m| &m.chat_route == route && m.sender_id != reader_id && !m.is_read)
        {
            message.is_read = true;
            message.status = MessageStatus::Read;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unread(&self, route: &ChatRoute, user_id: Uuid) -> PortResult<u64> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.chat_route == route && m.sender_id != user_id && !m.is_read)
            .count() as u64)
    }

    async fn history(&self, route: &ChatRoute, limit: u32) -> PortResult<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        let mut history: Vec<Message> = messages
            .iter()
            .filter(|m| &m.chat_route == route)
            .cloned()
            .collect();
        let keep = history.len().saturating_sub(limit as usize);
        Ok(history.split_off(keep))
    }
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Default)]
pub struct MockNotifications {
    notifications: Mutex<Vec<Notification>>,
    hold_creates: AtomicBool,
    release: Notify,
}

impl MockNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Makes `create` block until `release_creates`, simulating a slow
    /// notification store.
    pub fn hold_creates(&self) {
        self.hold_creates.store(true, Ordering::SeqCst);
    }

    pub fn release_creates(&self) {
        self.hold_creates.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }
}

#[async_trait]
impl NotificationStore for MockNotifications {
    async fn create(&self, notification: NewNotification) -> PortResult<Notification> {
        while self.hold_creates.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        let stored = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            content: notification.content,
            related: notification.related,
            sender_id: notification.sender_id,
            status: notification.status,
            call_id: notification.call_id,
            created_at: Utc::now(),
        };
        self.notifications.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_to_missed(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        content: &str,
    ) -> PortResult<()> {
        let mut notifications = self.notifications.lock().unwrap();
        let record = notifications
            .iter_mut()
            .find(|n| {
                n.user_id == user_id
                    && n.call_id == Some(call_id)
                    && n.kind == NotificationKind::IncomingCall
            })
            .ok_or_else(|| {
                PortError::NotFound(format!("No incoming-call notification for call {call_id}"))
            })?;
        record.kind = NotificationKind::MissedCall;
        record.content = content.to_string();
        Ok(())
    }

    async fn mark_read(&self, notification_id: Uuid) -> PortResult<()> {
        let mut notifications = self.notifications.lock().unwrap();
        let record = notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Notification {notification_id} not found"))
            })?;
        record.status = NotificationStatus::Read;
        Ok(())
    }

    async fn mark_read_by_kind(&self, user_id: Uuid, kind: NotificationKind) -> PortResult<()> {
        for record in self
            .notifications
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.kind == kind)
        {
            record.status = NotificationStatus::Read;
        }
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> PortResult<u64> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id && n.status == NotificationStatus::Unread)
            .count() as u64)
    }

    async fn list(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}
