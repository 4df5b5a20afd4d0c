//! Board — the server-side view of the opslagstavle.
//!
//! Holds an in-process copy of the message list, loaded once at startup and
//! kept current by merging realtime insert/update notifications. Requests
//! read a snapshot sorted by one of two total orders; the list is re-sorted
//! on every read rather than assuming events arrive in order.

use crate::models::message::{Message, MessageEvent};
use crate::services::message_service::MessageService;
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

/// The two display orders of the board.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    MostLiked,
}

/// `loading -> {error | empty | populated}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardPhase {
    Loading,
    Error,
    Empty,
    Populated,
}

enum LoadState {
    Loading,
    Failed(String),
    Loaded,
}

struct BoardInner {
    state: LoadState,
    messages: Vec<Message>,
}

#[derive(Clone)]
pub struct Board {
    inner: Arc<RwLock<BoardInner>>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BoardInner {
                state: LoadState::Loading,
                messages: Vec::new(),
            })),
        }
    }

    /// Fetch the full list from the repository. Failure parks the board in
    /// the error phase; a later successful load recovers it.
    pub async fn load(&self, service: &MessageService) {
        match service.list_all().await {
            Ok(messages) => {
                let mut inner = self.write();
                inner.messages = messages;
                inner.state = LoadState::Loaded;
            }
            Err(err) => {
                error!("board load failed: {}", err);
                self.write().state = LoadState::Failed(err.to_string());
            }
        }
    }

    /// Merge a realtime notification into the list.
    pub fn apply(&self, event: &MessageEvent) {
        let mut inner = self.write();
        match event {
            MessageEvent::Inserted(message) => {
                inner.messages.retain(|m| m.id != message.id);
                inner.messages.insert(0, message.clone());
            }
            MessageEvent::Updated(message) => {
                if let Some(slot) = inner.messages.iter_mut().find(|m| m.id == message.id) {
                    *slot = message.clone();
                }
            }
        }
    }

    pub fn phase(&self) -> BoardPhase {
        let inner = self.read();
        match &inner.state {
            LoadState::Loading => BoardPhase::Loading,
            LoadState::Failed(_) => BoardPhase::Error,
            LoadState::Loaded if inner.messages.is_empty() => BoardPhase::Empty,
            LoadState::Loaded => BoardPhase::Populated,
        }
    }

    pub fn error(&self) -> Option<String> {
        match &self.read().state {
            LoadState::Failed(msg) => Some(msg.clone()),
            _ => None,
        }
    }

    /// Sorted copy of the current list.
    pub fn snapshot(&self, order: SortOrder) -> Vec<Message> {
        let mut messages = self.read().messages.clone();
        sort_messages(&mut messages, order);
        messages
    }

    /// Consume realtime events until the channel closes.
    pub async fn follow(&self, mut rx: broadcast::Receiver<MessageEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.apply(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("board lagged behind by {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BoardInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BoardInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stable sort by the selected total order.
pub fn sort_messages(messages: &mut [Message], order: SortOrder) {
    match order {
        SortOrder::Newest => messages.sort_by(compare_newest),
        SortOrder::MostLiked => messages.sort_by(|a, b| {
            b.effective_likes()
                .cmp(&a.effective_likes())
                .then_with(|| compare_newest(a, b))
        }),
    }
}

fn compare_newest(a: &Message, b: &Message) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| id_rank(&b.id).cmp(&id_rank(&a.id)))
}

/// Numeric value of the leading hex segment of the id, the deterministic
/// tie-break for identical timestamps.
fn id_rank(id: &Uuid) -> u64 {
    let hex = id.simple().to_string();
    u64::from_str_radix(&hex[..8], 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(likes: i64, age_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::seconds(age_secs),
            author_name: "Anna".into(),
            body: "Hej!".into(),
            image_url: None,
            like_count: likes,
        }
    }

    #[test]
    fn newest_sort_is_non_increasing_and_idempotent() {
        let mut messages = vec![message(0, 30), message(0, 10), message(0, 20)];
        sort_messages(&mut messages, SortOrder::Newest);

        for pair in messages.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        let once = messages.clone();
        sort_messages(&mut messages, SortOrder::Newest);
        assert_eq!(messages, once);
    }

    #[test]
    fn newest_ties_break_on_leading_id_hex() {
        let now = Utc::now();
        let mut a = message(0, 0);
        let mut b = message(0, 0);
        a.created_at = now;
        b.created_at = now;
        a.id = Uuid::parse_str("00000001-0000-4000-8000-000000000000").expect("uuid");
        b.id = Uuid::parse_str("ffffffff-0000-4000-8000-000000000000").expect("uuid");

        let mut messages = vec![a.clone(), b.clone()];
        sort_messages(&mut messages, SortOrder::Newest);
        assert_eq!(messages[0].id, b.id);
        assert_eq!(messages[1].id, a.id);
    }

    #[test]
    fn most_liked_sorts_by_likes_then_recency() {
        let top = message(5, 100);
        let recent_tie = message(2, 10);
        let older_tie = message(2, 50);
        let zero = message(0, 5);

        let mut messages = vec![zero.clone(), older_tie.clone(), top.clone(), recent_tie.clone()];
        sort_messages(&mut messages, SortOrder::MostLiked);

        assert_eq!(messages[0].id, top.id);
        assert_eq!(messages[1].id, recent_tie.id);
        assert_eq!(messages[2].id, older_tie.id);
        assert_eq!(messages[3].id, zero.id);

        for pair in messages.windows(2) {
            assert!(pair[0].effective_likes() >= pair[1].effective_likes());
        }
    }

    #[test]
    fn most_liked_counts_legacy_trailers() {
        let mut legacy = message(0, 50);
        legacy.body = "Hej!\n\n[LIKES:4]".into();
        let column = message(2, 10);

        let mut messages = vec![column.clone(), legacy.clone()];
        sort_messages(&mut messages, SortOrder::MostLiked);
        assert_eq!(messages[0].id, legacy.id);
    }

    #[test]
    fn insert_events_prepend_and_dedup() {
        let board = Board::new();
        let first = message(0, 10);
        let second = message(0, 0);

        board.apply(&MessageEvent::Inserted(first.clone()));
        board.apply(&MessageEvent::Inserted(second.clone()));
        // A re-delivered insert must not duplicate the row.
        board.apply(&MessageEvent::Inserted(second.clone()));

        let snapshot = board.snapshot(SortOrder::Newest);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, second.id);
    }

    #[test]
    fn update_events_replace_by_id() {
        let board = Board::new();
        let original = message(0, 10);
        board.apply(&MessageEvent::Inserted(original.clone()));

        let mut updated = original.clone();
        updated.like_count = 9;
        board.apply(&MessageEvent::Updated(updated));

        let snapshot = board.snapshot(SortOrder::MostLiked);
        assert_eq!(snapshot[0].like_count, 9);

        // Updates for unknown ids are dropped.
        board.apply(&MessageEvent::Updated(message(1, 0)));
        assert_eq!(board.snapshot(SortOrder::Newest).len(), 1);
    }

    #[tokio::test]
    async fn phases_follow_load_outcomes() {
        use crate::services::message_service::test_service;

        let board = Board::new();
        assert_eq!(board.phase(), BoardPhase::Loading);

        let service = test_service().await;
        board.load(&service).await;
        assert_eq!(board.phase(), BoardPhase::Empty);

        service.save("Anna", "Hej!", None).await.expect("save");
        board.load(&service).await;
        assert_eq!(board.phase(), BoardPhase::Populated);
    }

    #[tokio::test]
    async fn load_failure_parks_board_in_error() {
        use crate::services::message_service::MessageService;
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect");
        let service = MessageService::new(Arc::new(pool));

        let board = Board::new();
        board.load(&service).await;
        assert_eq!(board.phase(), BoardPhase::Error);
        assert!(board.error().expect("error text").contains("system error"));
    }
}
