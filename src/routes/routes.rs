//! Route table for the whole site.
//!
//! ## Structure
//! - **API**
//!   - `POST /api/upload` — multipart image upload
//!   - `GET  /api/messages` — board snapshot (`?sort=newest|most_liked`)
//!   - `POST /api/messages` — create a message
//!   - `POST /api/messages/{id}/likes` — overwrite the like counter
//!   - `GET  /api/messages/events` — SSE change feed
//!   - `GET  /api/checkmystatus` — diagnostics
//! - **Blobs**
//!   - `GET /files/{*path}` — bucket blobs (wildcard allows `prefix/name`)
//!   - `GET /uploads/{file}` — fallback-directory blobs
//! - **Pages**
//!   - `GET /`, `/turne`, `/om`, `/brevkasse`, `/opslagstavle`

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        message_handlers::{create_message, list_messages, message_events, set_likes},
        page_handlers::{about, board_page, composer_page, home, tour},
        status_handlers::checkmystatus,
        upload_handlers::{get_fallback_file, get_file, upload},
    },
    services::storage_service::MAX_UPLOAD_BYTES,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. The body limit leaves headroom above the upload cap so
/// oversized files reach the storage proxy and get its explicit error.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // API
        .route("/api/upload", post(upload))
        .route("/api/messages", get(list_messages).post(create_message))
        .route("/api/messages/{id}/likes", post(set_likes))
        .route("/api/messages/events", get(message_events))
        .route("/api/checkmystatus", get(checkmystatus))
        // blob serving
        .route("/files/{*path}", get(get_file))
        .route("/uploads/{file}", get(get_fallback_file))
        // pages
        .route("/", get(home))
        .route("/turne", get(tour))
        .route("/om", get(about))
        .route("/brevkasse", get(composer_page))
        .route("/opslagstavle", get(board_page))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
}
