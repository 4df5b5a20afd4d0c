//! `GET /api/checkmystatus` — operational diagnostics, not product
//! functionality: reports configuration presence, pings the database, lists
//! the first upload prefix, and performs a canary upload of a 1×1 PNG.

use crate::{AppState, errors::AppError};
use axum::{Json, extract::State, response::IntoResponse};
use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;
use std::env;

/// 1×1 transparent PNG used as the canary payload.
const CANARY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

const CHECKED_ENV_VARS: [&str; 7] = [
    "BREVKASSE_HOST",
    "BREVKASSE_PORT",
    "BREVKASSE_STORAGE_DIR",
    "BREVKASSE_FALLBACK_DIR",
    "BREVKASSE_DATABASE_URL",
    "BREVKASSE_UPLOAD_PREFIXES",
    "BREVKASSE_PUBLIC_BASE_URL",
];

#[derive(Serialize)]
struct StatusReport {
    status: &'static str,
    env: Vec<EnvPresence>,
    config: ConfigReport,
    database: CheckOutcome,
    files: FilesReport,
    test: CanaryReport,
}

#[derive(Serialize)]
struct EnvPresence {
    name: &'static str,
    set: bool,
}

#[derive(Serialize)]
struct ConfigReport {
    storage_dir: String,
    fallback_dir: String,
    upload_prefixes: Vec<String>,
    public_base_url: Option<String>,
}

#[derive(Serialize)]
struct CheckOutcome {
    ok: bool,
    error: Option<String>,
}

#[derive(Serialize)]
struct FilesReport {
    prefix: String,
    names: Vec<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct CanaryReport {
    success: bool,
    url: Option<String>,
    etag: Option<String>,
    error: Option<String>,
}

pub async fn checkmystatus(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let env_report = CHECKED_ENV_VARS
        .iter()
        .map(|name| EnvPresence {
            name,
            set: env::var(name).is_ok(),
        })
        .collect();

    let config = ConfigReport {
        storage_dir: state.storage.store().root.display().to_string(),
        fallback_dir: state.fallback_dir.display().to_string(),
        upload_prefixes: state.storage.prefixes().to_vec(),
        public_base_url: state.storage.store().public_base.clone(),
    };

    let database = match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
        .fetch_one(&*state.messages.db)
        .await
    {
        Ok(_) => CheckOutcome {
            ok: true,
            error: None,
        },
        Err(err) => CheckOutcome {
            ok: false,
            error: Some(err.to_string()),
        },
    };

    let first_prefix = state
        .storage
        .prefixes()
        .first()
        .cloned()
        .unwrap_or_default();
    let files = match state.storage.store().list(&first_prefix).await {
        Ok(names) => FilesReport {
            prefix: first_prefix,
            names,
            error: None,
        },
        Err(err) => FilesReport {
            prefix: first_prefix,
            names: Vec::new(),
            error: Some(err.to_string()),
        },
    };

    let test = run_canary_upload(&state).await;

    let report = StatusReport {
        status: "ok",
        env: env_report,
        config,
        database,
        files,
        test,
    };
    Ok(Json(report))
}

async fn run_canary_upload(state: &AppState) -> CanaryReport {
    let bytes = match general_purpose::STANDARD.decode(CANARY_PNG_BASE64) {
        Ok(bytes) => bytes,
        Err(err) => {
            return CanaryReport {
                success: false,
                url: None,
                etag: None,
                error: Some(format!("canary decode failed: {}", err)),
            };
        }
    };

    match state
        .storage
        .store_image("canary.png", Some("image/png"), &bytes)
        .await
    {
        Ok(stored) => CanaryReport {
            success: true,
            url: Some(stored.url),
            etag: Some(stored.etag),
            error: None,
        },
        Err(err) => CanaryReport {
            success: false,
            url: None,
            etag: None,
            error: Some(err.to_string()),
        },
    }
}
