//! Represents a message posted to the opslagstavle (bulletin board).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single guestbook message.
///
/// `like_count` lives in a dedicated column. Rows imported from the legacy
/// schema may instead carry a `\n\n[LIKES:n]` trailer at the end of `body`;
/// that encoding is read but never written back.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier, assigned by the service at insert.
    pub id: Uuid,

    /// When the message was created.
    pub created_at: DateTime<Utc>,

    /// Display name of the author, trimmed and non-empty.
    pub author_name: String,

    /// Free-text message body. May end in a legacy likes trailer.
    pub body: String,

    /// Absolute URL into the blob store, or a root-relative fallback path.
    pub image_url: Option<String>,

    /// Number of likes. Never negative.
    pub like_count: i64,
}

impl Message {
    /// Body with any legacy likes trailer stripped, for display.
    pub fn visible_body(&self) -> &str {
        strip_likes_trailer(&self.body)
    }

    /// Like count to display: the dedicated column wins, the legacy trailer
    /// only fills in for rows that were never migrated.
    pub fn effective_likes(&self) -> i64 {
        if self.like_count > 0 {
            self.like_count
        } else {
            extract_likes_from_body(&self.body).unwrap_or(0)
        }
    }
}

/// Realtime change notification emitted by the repository and consumed by
/// the board and the SSE endpoint.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "event", content = "message", rename_all = "snake_case")]
pub enum MessageEvent {
    Inserted(Message),
    Updated(Message),
}

/// Parse a legacy `\n\n[LIKES:n]` trailer at the very end of a body.
pub fn extract_likes_from_body(body: &str) -> Option<i64> {
    let idx = body.rfind("\n\n[LIKES:")?;
    let rest = &body[idx + "\n\n[LIKES:".len()..];
    let digits = rest.strip_suffix(']')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Return `body` without its legacy likes trailer, if one is present.
pub fn strip_likes_trailer(body: &str) -> &str {
    match body.rfind("\n\n[LIKES:") {
        Some(idx) if extract_likes_from_body(body).is_some() => &body[..idx],
        _ => body,
    }
}
