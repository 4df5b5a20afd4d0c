//! JSON API for the message board.
//!
//! - `GET  /api/messages?sort=newest|most_liked` — sorted board snapshot
//! - `POST /api/messages` — create a message
//! - `POST /api/messages/{id}/likes` — overwrite the like counter
//! - `GET  /api/messages/events` — SSE stream of insert/update events

use crate::{
    AppState,
    errors::AppError,
    models::message::{Message, MessageEvent},
    services::board::{BoardPhase, SortOrder},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Wire representation of a message: the visible body with any legacy likes
/// trailer stripped, and the effective like count.
#[derive(Serialize, Debug)]
pub struct MessageView {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub name: String,
    pub message: String,
    pub image_url: Option<String>,
    pub likes: i64,
}

impl From<&Message> for MessageView {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            created_at: msg.created_at,
            name: msg.author_name.clone(),
            message: msg.visible_body().to_string(),
            image_url: msg.image_url.clone(),
            likes: msg.effective_likes(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub sort: SortOrder,
}

/// `GET /api/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    if state.board.phase() == BoardPhase::Error {
        // The startup load failed; retry against the repository directly so
        // a recovered database brings the board back.
        state.board.load(&state.messages).await;
    }
    if let Some(err) = state.board.error() {
        return Err(AppError::internal(err));
    }

    let views: Vec<MessageView> = state
        .board
        .snapshot(query.sort)
        .iter()
        .map(MessageView::from)
        .collect();
    Ok(Json(serde_json::json!({ "messages": views })))
}

#[derive(Deserialize, Debug)]
pub struct CreateMessageReq {
    pub name: String,
    pub message: String,
    /// Accepted for compatibility with the old contact form; unused.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// `POST /api/messages`
pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageReq>,
) -> Result<impl IntoResponse, AppError> {
    let _ = req.email;
    let message = state
        .messages
        .save(&req.name, &req.message, req.image_url)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": MessageView::from(&message),
        })),
    ))
}

#[derive(Deserialize, Debug)]
pub struct SetLikesReq {
    pub like_count: i64,
}

/// `POST /api/messages/{id}/likes`
///
/// The client computes the new count itself (optimistic toggle); the server
/// only clamps it non-negative. There is deliberately no authorization.
pub async fn set_likes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetLikesReq>,
) -> Result<impl IntoResponse, AppError> {
    let message = state.messages.set_likes(id, req.like_count).await?;
    Ok(Json(MessageView::from(&message)))
}

/// `GET /api/messages/events` — realtime change feed as server-sent events.
pub async fn message_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.messages.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = match &event {
                        MessageEvent::Inserted(_) => "insert",
                        MessageEvent::Updated(_) => "update",
                    };
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            return Some((Ok(Event::default().event(name).data(data)), rx));
                        }
                        Err(_) => continue,
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn view_strips_trailer_and_uses_effective_likes() {
        let msg = Message {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            author_name: "Anna".into(),
            body: "Hej!\n\n[LIKES:3]".into(),
            image_url: None,
            like_count: 0,
        };
        let view = MessageView::from(&msg);
        assert_eq!(view.message, "Hej!");
        assert_eq!(view.likes, 3);
    }

    #[test]
    fn sort_query_accepts_both_orders() {
        let q: ListQuery = serde_json::from_str(r#"{"sort":"most_liked"}"#).expect("parse");
        assert_eq!(q.sort, SortOrder::MostLiked);
        let q: ListQuery = serde_json::from_str(r#"{}"#).expect("parse");
        assert_eq!(q.sort, SortOrder::Newest);
    }
}
