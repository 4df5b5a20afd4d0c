//! Upload endpoint and blob serving.
//!
//! `POST /api/upload` accepts a multipart form with a `file` field, stores
//! the bytes through the storage proxy and answers `{"success":true,"url"}`.
//! `GET /files/{*path}` and `GET /uploads/{file}` stream stored blobs back
//! to the browser.

use crate::{
    AppState,
    errors::AppError,
    services::storage_service::{content_type_for, ensure_path_safe},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io::ErrorKind;
use tokio_util::io::ReaderStream;

/// `POST /api/upload` — multipart field `file`.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {}", err)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("billede.jpg").to_string();
        let content_type = field.content_type().map(|ct| ct.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("could not read file field: {}", err)))?;

        let stored = state
            .storage
            .store_image(&filename, content_type.as_deref(), &bytes)
            .await?;

        return Ok(Json(json!({
            "success": true,
            "url": stored.url,
            "etag": stored.etag,
        })));
    }

    Err(AppError::bad_request("no file received"))
}

/// `GET /files/{*path}` — stream a bucket blob.
pub async fn get_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let (file, len) = state.storage.store().open(&path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::not_found(format!("no such file: {}", path))
        } else {
            AppError::internal(err.to_string())
        }
    })?;

    Ok(stream_blob(file, len, content_type_for(&path)))
}

/// `GET /uploads/{file}` — stream a blob from the local fallback directory.
/// Single path segment only; the fallback dir has no folder structure.
pub async fn get_fallback_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    ensure_path_safe(&name).map_err(|_| AppError::bad_request("invalid file name"))?;
    if name.contains('/') {
        return Err(AppError::bad_request("invalid file name"));
    }

    let full = state.fallback_dir.join(&name);
    let file = tokio::fs::File::open(&full).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::not_found(format!("no such file: {}", name))
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    Ok(stream_blob(file, len, content_type_for(&name)))
}

fn stream_blob(file: tokio::fs::File, len: u64, content_type: &'static str) -> Response {
    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    response
}
