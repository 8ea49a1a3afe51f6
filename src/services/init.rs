//! Startup helpers: database connection and migrations.

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Userinfo is dropped when the URL parses. Otherwise everything up to the
/// last '@' is hidden.
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else if let Some(at_pos) = db_url.rfind('@') {
        format!("(redacted){}", &db_url[at_pos + 1..])
    } else {
        "(redacted)".to_string()
    }
}

/// Open the SQLite pool and run the embedded migrations.
///
/// The parent directory of the database file is created when missing.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let existed = db_file_path.exists();
    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    if existed {
        tracing::info!("Connected to database file: {}", db_file_path.display());
    } else {
        tracing::info!("Database file created: {}", db_file_path.display());
    }

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
