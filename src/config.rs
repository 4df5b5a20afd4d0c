use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory of the local blob store (bucket replacement).
    pub storage_dir: String,
    /// Directory for last-resort uploads, served as `/uploads/...`.
    pub fallback_dir: String,
    pub database_url: String,
    /// Candidate folder prefixes inside the bucket, tried in order on upload.
    pub upload_prefixes: Vec<String>,
    /// Absolute URL prefix for stored blobs; root-relative URLs when unset.
    pub public_base_url: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Strik & Drik brevkasse server")]
pub struct Args {
    /// Host to bind to (overrides BREVKASSE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BREVKASSE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store root directory (overrides BREVKASSE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Fallback upload directory (overrides BREVKASSE_FALLBACK_DIR)
    #[arg(long)]
    pub fallback_dir: Option<String>,

    /// Database URL (overrides BREVKASSE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Comma-separated upload prefixes (overrides BREVKASSE_UPLOAD_PREFIXES)
    #[arg(long)]
    pub upload_prefixes: Option<String>,

    /// Public base URL for blob links (overrides BREVKASSE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Run the interactive terminal composer instead of the server
    #[arg(long)]
    pub compose: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig plus the
    /// migrate/compose mode flags.
    pub fn from_env_and_args() -> Result<(Self, Args)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("BREVKASSE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("BREVKASSE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing BREVKASSE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading BREVKASSE_PORT"),
        };
        let env_storage =
            env::var("BREVKASSE_STORAGE_DIR").unwrap_or_else(|_| "./data/bucket".into());
        let env_fallback =
            env::var("BREVKASSE_FALLBACK_DIR").unwrap_or_else(|_| "./public/uploads".into());
        let env_db = env::var("BREVKASSE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/brevkasse.db".into());
        let env_prefixes =
            env::var("BREVKASSE_UPLOAD_PREFIXES").unwrap_or_else(|_| "billeder".into());
        let env_public_base = env::var("BREVKASSE_PUBLIC_BASE_URL").ok();

        // --- Merge ---
        let prefixes_raw = args.upload_prefixes.clone().unwrap_or(env_prefixes);
        let upload_prefixes = parse_prefixes(&prefixes_raw);
        if upload_prefixes.is_empty() {
            anyhow::bail!("at least one upload prefix is required");
        }

        let cfg = Self {
            host: args.host.clone().unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            fallback_dir: args.fallback_dir.clone().unwrap_or(env_fallback),
            database_url: args.database_url.clone().unwrap_or(env_db),
            upload_prefixes,
            public_base_url: args.public_base_url.clone().or(env_public_base),
        };

        Ok((cfg, args))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.trim_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_normalizes_prefixes() {
        assert_eq!(
            parse_prefixes("p0/eget_0, uploads ,/billeder/"),
            vec!["p0/eget_0", "uploads", "billeder"]
        );
        assert!(parse_prefixes(" , ").is_empty());
    }
}
