//! Core data models for the brevkasse message board.
//!
//! These entities map to the SQLite `messages` table via `sqlx::FromRow`
//! and serialize naturally as JSON via `serde`.

pub mod message;
