//! services/realtime/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the persistence ports from the `core` crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentorhub_core::domain::{
    ChatRoute, Contact, ContentType, FileMetadata, Message, MessageStatus, NewMessage,
    NewNotification, Notification, NotificationKind, NotificationRef, NotificationStatus,
};
use mentorhub_core::ports::{
    AuthService, ContactService, MessageStore, NotificationStore, PortError, PortResult,
};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Column <-> Domain Encoding Helpers
//=========================================================================================

fn route_columns(route: &ChatRoute) -> (&'static str, Uuid) {
    match route {
        ChatRoute::Group(id) => ("group", *id),
        ChatRoute::Collaboration(id) => ("user-mentor", *id),
        ChatRoute::Connection(id) => ("user-user", *id),
    }
}

fn route_from_columns(kind: &str, id: Uuid) -> PortResult<ChatRoute> {
    match kind {
        "group" => Ok(ChatRoute::Group(id)),
        "user-mentor" => Ok(ChatRoute::Collaboration(id)),
        "user-user" => Ok(ChatRoute::Connection(id)),
        other => Err(PortError::Unexpected(format!(
            "Unknown chat route kind '{other}' in database"
        ))),
    }
}

fn related_columns(related: &NotificationRef) -> (&'static str, Uuid) {
    match related {
        NotificationRef::Chat(route) => route_columns(route),
        NotificationRef::Task(id) => ("task", *id),
    }
}

fn related_from_columns(kind: &str, id: Uuid) -> PortResult<NotificationRef> {
    match kind {
        "task" => Ok(NotificationRef::Task(id)),
        other => Ok(NotificationRef::Chat(route_from_columns(other, id)?)),
    }
}

fn notification_kind_column(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Message => "message",
        NotificationKind::IncomingCall => "incoming_call",
        NotificationKind::MissedCall => "missed_call",
        NotificationKind::TaskReminder => "task_reminder",
    }
}

fn notification_kind_from_column(kind: &str) -> PortResult<NotificationKind> {
    match kind {
        "message" => Ok(NotificationKind::Message),
        "incoming_call" => Ok(NotificationKind::IncomingCall),
        "missed_call" => Ok(NotificationKind::MissedCall),
        "task_reminder" => Ok(NotificationKind::TaskReminder),
        other => Err(PortError::Unexpected(format!(
            "Unknown notification kind '{other}' in database"
        ))),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    route_kind: String,
    route_id: Uuid,
    content: String,
    content_type: String,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    file_mime: Option<String>,
    is_read: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let chat_route = route_from_columns(&self.route_kind, self.route_id)?;
        let content_type = match self.content_type.as_str() {
            "text" => ContentType::Text,
            "file" => ContentType::File,
            other => {
                return Err(PortError::Unexpected(format!(
                    "Unknown content type '{other}' in database"
                )))
            }
        };
        let status = match self.status.as_str() {
            "pending" => MessageStatus::Pending,
            "sent" => MessageStatus::Sent,
            "read" => MessageStatus::Read,
            other => {
                return Err(PortError::Unexpected(format!(
                    "Unknown message status '{other}' in database"
                )))
            }
        };
        let file = match (self.file_url, self.file_name) {
            (Some(url), Some(name)) => Some(FileMetadata {
                url,
                name,
                size: self.file_size.unwrap_or(0) as u64,
                mime_type: self.file_mime.unwrap_or_default(),
            }),
            _ => None,
        };
        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            chat_route,
            content: self.content,
            content_type,
            file,
            is_read: self.is_read,
            status,
            timestamp: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    content: String,
    related_kind: String,
    related_id: Uuid,
    sender_id: Uuid,
    status: String,
    call_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl NotificationRecord {
    fn to_domain(self) -> PortResult<Notification> {
        let related = related_from_columns(&self.related_kind, self.related_id)?;
        let kind = notification_kind_from_column(&self.kind)?;
        let status = match self.status.as_str() {
            "unread" => NotificationStatus::Unread,
            "read" => NotificationStatus::Read,
            other => {
                return Err(PortError::Unexpected(format!(
                    "Unknown notification status '{other}' in database"
                )))
            }
        };
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind,
            content: self.content,
            related,
            sender_id: self.sender_id,
            status,
            call_id: self.call_id,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ContactRecord {
    id: Uuid,
    route_kind: String,
    route_id: Uuid,
}

impl DbAdapter {
    async fn members_of(&self, contact_id: Uuid) -> PortResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM contact_members WHERE contact_id = $1")
            .bind(contact_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn contact_to_domain(&self, record: ContactRecord) -> PortResult<Contact> {
        let route = route_from_columns(&record.route_kind, record.route_id)?;
        let member_ids = self.members_of(record.id).await?;
        Ok(Contact {
            id: record.id,
            route,
            member_ids,
        })
    }
}

//=========================================================================================
// `ContactService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContactService for DbAdapter {
    async fn find_contact_by_id(&self, contact_id: Uuid) -> PortResult<Contact> {
        let record = sqlx::query_as::<_, ContactRecord>(
            "SELECT id, route_kind, route_id FROM contacts WHERE id = $1",
        )
        .bind(contact_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Contact {contact_id} not found"))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        self.contact_to_domain(record).await
    }

    async fn find_contacts_by_user_id(&self, user_id: Uuid) -> PortResult<Vec<Contact>> {
        let records = sqlx::query_as::<_, ContactRecord>(
            "SELECT c.id, c.route_kind, c.route_id FROM contacts c \
             JOIN contact_members m ON m.contact_id = c.id WHERE m.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut contacts = Vec::with_capacity(records.len());
        for record in records {
            contacts.push(self.contact_to_domain(record).await?);
        }
        Ok(contacts)
    }

    async fn find_participants(&self, route: &ChatRoute) -> PortResult<Vec<Uuid>> {
        let (kind, id) = route_columns(route);
        let record = sqlx::query_as::<_, ContactRecord>(
            "SELECT id, route_kind, route_id FROM contacts WHERE route_kind = $1 AND route_id = $2",
        )
        .bind(kind)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("No contact for route {route}")),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        self.members_of(record.id).await
    }
}

//=========================================================================================
// `MessageStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageStore for DbAdapter {
    async fn save_message(&self, message: NewMessage) -> PortResult<Message> {
        let (route_kind, route_id) = route_columns(&message.chat_route);
        let content_type = match message.content_type {
            ContentType::Text => "text",
            ContentType::File => "file",
        };
        let (file_url, file_name, file_size, file_mime) = match &message.file {
            Some(file) => (
                Some(file.url.clone()),
                Some(file.name.clone()),
                Some(file.size as i64),
                Some(file.mime_type.clone()),
            ),
            None => (None, None, None, None),
        };

        let record = sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO messages \
               (id, sender_id, route_kind, route_id, content, content_type, \
                file_url, file_name, file_size, file_mime, is_read, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, 'sent') \
             RETURNING id, sender_id, route_kind, route_id, content, content_type, \
                       file_url, file_name, file_size, file_mime, is_read, status, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(message.sender_id)
        .bind(route_kind)
        .bind(route_id)
        .bind(&message.content)
        .bind(content_type)
        .bind(file_url)
        .bind(file_name)
        .bind(file_size)
        .bind(file_mime)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        record.to_domain()
    }

    async fn mark_read(&self, route: &ChatRoute, reader_id: Uuid) -> PortResult<u64> {
        let (route_kind, route_id) = route_columns(route);
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE, status = 'read' \
             WHERE route_kind = $1 AND route_id = $2 AND sender_id <> $3 AND is_read = FALSE",
        )
        .bind(route_kind)
        .bind(route_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count_unread(&self, route: &ChatRoute, user_id: Uuid) -> PortResult<u64> {
        let (route_kind, route_id) = route_columns(route);
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM messages \
             WHERE route_kind = $1 AND route_id = $2 AND sender_id <> $3 AND is_read = FALSE",
        )
        .bind(route_kind)
        .bind(route_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let unread: i64 = row.get("unread");
        Ok(unread as u64)
    }

    async fn history(&self, route: &ChatRoute, limit: u32) -> PortResult<Vec<Message>> {
        let (route_kind, route_id) = route_columns(route);
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, sender_id, route_kind, route_id, content, content_type, \
                    file_url, file_name, file_size, file_mime, is_read, status, created_at \
             FROM (SELECT * FROM messages \
                   WHERE route_kind = $1 AND route_id = $2 \
                   ORDER BY created_at DESC LIMIT $3) recent \
             ORDER BY created_at ASC",
        )
        .bind(route_kind)
        .bind(route_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `NotificationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl NotificationStore for DbAdapter {
    async fn create(&self, notification: NewNotification) -> PortResult<Notification> {
        let (related_kind, related_id) = related_columns(&notification.related);
        let status = match notification.status {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        };
        let record = sqlx::query_as::<_, NotificationRecord>(
            "INSERT INTO notifications \
               (id, user_id, kind, content, related_kind, related_id, sender_id, status, call_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, user_id, kind, content, related_kind, related_id, \
                       sender_id, status, call_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification_kind_column(notification.kind))
        .bind(&notification.content)
        .bind(related_kind)
        .bind(related_id)
        .bind(notification.sender_id)
        .bind(status)
        .bind(notification.call_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        record.to_domain()
    }

    async fn update_to_missed(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        content: &str,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET kind = 'missed_call', content = $3 \
             WHERE user_id = $1 AND call_id = $2 AND kind = 'incoming_call'",
        )
        .bind(user_id)
        .bind(call_id)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "No incoming-call notification for call {call_id}"
            )));
        }
        Ok(())
    }

    async fn mark_read(&self, notification_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE notifications SET status = 'read' WHERE id = $1")
            .bind(notification_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Notification {notification_id} not found"
            )));
        }
        Ok(())
    }

    async fn mark_read_by_kind(&self, user_id: Uuid, kind: NotificationKind) -> PortResult<()> {
        sqlx::query("UPDATE notifications SET status = 'read' WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(notification_kind_column(kind))
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> PortResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM notifications \
             WHERE user_id = $1 AND status = 'unread'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let unread: i64 = row.get("unread");
        Ok(unread as u64)
    }

    async fn list(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT id, user_id, kind, content, related_kind, related_id, \
                    sender_id, status, call_id, created_at \
             FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for DbAdapter {
    async fn validate_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row = sqlx::query(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        match row {
            Some(row) => Ok(row.get("user_id")),
            None => Err(PortError::Unauthorized),
        }
    }
}
