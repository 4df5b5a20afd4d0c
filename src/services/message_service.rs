//! MessageService — persistence for guestbook messages.
//!
//! Single `messages` table in SQLite. Every successful mutation is published
//! on a broadcast channel so the board view and SSE subscribers see changes
//! without polling.

use crate::models::message::{Message, MessageEvent};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("a similar message was already sent")]
    Duplicate,
    #[error("system error: message table is missing")]
    SchemaMissing,
    #[error("message {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

pub type MessageResult<T> = Result<T, MessageError>;

#[derive(Clone)]
pub struct MessageService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    events: broadcast::Sender<MessageEvent>,
}

impl MessageService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { db, events }
    }

    /// Subscribe to realtime insert/update notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.events.subscribe()
    }

    /// Validate and persist a new message. Fields are trimmed; empty name or
    /// body is rejected before the database is touched.
    pub async fn save(
        &self,
        author_name: &str,
        body: &str,
        image_url: Option<String>,
    ) -> MessageResult<Message> {
        let author_name = author_name.trim();
        let body = body.trim();
        if author_name.is_empty() {
            return Err(MessageError::EmptyField("name"));
        }
        if body.is_empty() {
            return Err(MessageError::EmptyField("message"));
        }

        let message = Message {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            author_name: author_name.to_string(),
            body: body.to_string(),
            image_url,
            like_count: 0,
        };

        sqlx::query(
            "INSERT INTO messages (id, created_at, author_name, body, image_url, like_count)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id)
        .bind(message.created_at)
        .bind(&message.author_name)
        .bind(&message.body)
        .bind(&message.image_url)
        .bind(message.like_count)
        .execute(&*self.db)
        .await
        .map_err(classify_db_error)?;

        debug!("saved message {} from `{}`", message.id, message.author_name);
        let _ = self.events.send(MessageEvent::Inserted(message.clone()));
        Ok(message)
    }

    /// All messages, newest first.
    pub async fn list_all(&self) -> MessageResult<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT id, created_at, author_name, body, image_url, like_count
             FROM messages ORDER BY created_at DESC",
        )
        .fetch_all(&*self.db)
        .await
        .map_err(classify_db_error)
    }

    /// Overwrite the like counter for a message with a client-computed value.
    ///
    /// Likes carry no authorization; the value is only clamped so the counter
    /// never goes negative.
    pub async fn set_likes(&self, id: Uuid, like_count: i64) -> MessageResult<Message> {
        let like_count = like_count.max(0);
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages SET like_count = ? WHERE id = ?
             RETURNING id, created_at, author_name, body, image_url, like_count",
        )
        .bind(like_count)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => MessageError::NotFound(id),
            other => classify_db_error(other),
        })?;

        let _ = self.events.send(MessageEvent::Updated(message.clone()));
        Ok(message)
    }
}

/// Apply schema statements from an embedded migration file, one at a time.
pub async fn apply_schema(db: &SqlitePool, sql: &str) -> Result<(), sqlx::Error> {
    for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

/// Map raw database failures onto the user-facing taxonomy: unique-constraint
/// violations become "duplicate", a missing table becomes "system error".
fn classify_db_error(err: sqlx::Error) -> MessageError {
    if let sqlx::Error::Database(db_err) = &err {
        let msg = db_err.message().to_ascii_lowercase();
        if msg.contains("unique") {
            return MessageError::Duplicate;
        }
        if msg.contains("no such table") {
            return MessageError::SchemaMissing;
        }
    }
    MessageError::Sqlx(err)
}

#[cfg(test)]
pub(crate) async fn test_service() -> MessageService {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    apply_schema(&pool, include_str!("../../migrations/0001_init.sql"))
        .await
        .expect("apply schema");
    MessageService::new(Arc::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn save_trims_and_defaults_likes_to_zero() {
        let service = test_service().await;
        let before = Utc::now();

        let message = service
            .save("  Anna  ", "  Hej!  ", None)
            .await
            .expect("save");

        assert_eq!(message.author_name, "Anna");
        assert_eq!(message.body, "Hej!");
        assert_eq!(message.like_count, 0);
        assert!(message.created_at >= before);

        let listed = service.list_all().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, message.id);
        assert_eq!(listed[0].body, "Hej!");
    }

    #[tokio::test]
    async fn save_rejects_blank_fields_before_touching_the_db() {
        let service = test_service().await;

        assert!(matches!(
            service.save("   ", "Hej!", None).await,
            Err(MessageError::EmptyField("name"))
        ));
        assert!(matches!(
            service.save("Anna", " \n ", None).await,
            Err(MessageError::EmptyField("message"))
        ));
        assert!(service.list_all().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let service = test_service().await;
        service.save("A", "første", None).await.expect("save");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service.save("B", "anden", None).await.expect("save");

        let listed = service.list_all().await.expect("list");
        assert_eq!(listed[0].body, "anden");
        assert_eq!(listed[1].body, "første");
    }

    #[tokio::test]
    async fn set_likes_clamps_and_round_trips() {
        let service = test_service().await;
        let message = service.save("Anna", "Hej!", None).await.expect("save");

        let liked = service.set_likes(message.id, 1).await.expect("like");
        assert_eq!(liked.like_count, 1);

        // Toggling back returns the displayed count to its original value.
        let unliked = service.set_likes(message.id, 0).await.expect("unlike");
        assert_eq!(unliked.like_count, message.like_count);

        let clamped = service.set_likes(message.id, -5).await.expect("clamp");
        assert_eq!(clamped.like_count, 0);
    }

    #[tokio::test]
    async fn set_likes_on_unknown_id_is_not_found() {
        let service = test_service().await;
        assert!(matches!(
            service.set_likes(Uuid::new_v4(), 1).await,
            Err(MessageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mutations_broadcast_events() {
        let service = test_service().await;
        let mut rx = service.subscribe();

        let saved = service.save("Anna", "Hej!", None).await.expect("save");
        match rx.recv().await.expect("insert event") {
            MessageEvent::Inserted(msg) => assert_eq!(msg.id, saved.id),
            other => panic!("unexpected event {:?}", other),
        }

        service.set_likes(saved.id, 3).await.expect("like");
        match rx.recv().await.expect("update event") {
            MessageEvent::Updated(msg) => assert_eq!(msg.like_count, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_table_maps_to_schema_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect");
        let service = MessageService::new(Arc::new(pool));

        assert!(matches!(
            service.save("Anna", "Hej!", None).await,
            Err(MessageError::SchemaMissing)
        ));
        assert!(matches!(
            service.list_all().await,
            Err(MessageError::SchemaMissing)
        ));
    }
}
