use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::AppConfig;
use services::board::Board;
use services::composer::{self, Composer};
use services::message_service::{self, MessageService};
use services::storage_service::{DiskStore, StorageService};

const SCHEMA_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService<DiskStore>,
    pub messages: MessageService,
    pub board: Board,
    pub fallback_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + mode flags ---
    let (cfg, args) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting brevkasse with config: {:?}", cfg);

    // --- Ensure blob directories exist ---
    for dir in [&cfg.storage_dir, &cfg.fallback_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)?;
            tracing::info!("Created directory {}", dir);
        }
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");

    if !db_url.contains(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        // SQLx does not create the database file on its own.
        if let Err(err) = fs::OpenOptions::new().create(true).write(true).open(db_path) {
            tracing::warn!("could not pre-create database file {}: {}", db_path, err);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // Schema statements are idempotent; apply them on every start.
    message_service::apply_schema(&db, SCHEMA_SQL).await?;
    if args.migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core services ---
    let store = DiskStore::new(cfg.storage_dir.as_str(), cfg.public_base_url.clone());
    let storage = StorageService::new(store, cfg.upload_prefixes.clone(), cfg.fallback_dir.as_str());
    let messages = MessageService::new(db);

    if args.compose {
        let composer = Composer::new(storage, messages);
        return composer::run_interactive(composer).await;
    }

    // --- Board view: initial load + realtime follow ---
    let board = Board::new();
    board.load(&messages).await;
    let follower = board.clone();
    let events = messages.subscribe();
    tokio::spawn(async move {
        follower.follow(events).await;
    });

    // --- Build router ---
    let state = AppState {
        storage,
        messages,
        board,
        fallback_dir: PathBuf::from(&cfg.fallback_dir),
    };
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
