//! SQLite-backed config store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{ConfigStore, StoreError};

/// Config cache in a single-table SQLite database.
///
/// The store is synchronous to its callers; it owns a small tokio runtime
/// and blocks on it for each query. Do not call it from inside another
/// tokio runtime.
pub struct SqliteConfigStore {
    pool: Mutex<Option<SqlitePool>>,
    runtime: Runtime,
    location: String,
}

impl core::fmt::Debug for SqliteConfigStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqliteConfigStore")
            .field("location", &self.location)
            .finish()
    }
}

impl SqliteConfigStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create config directory at {:?}", parent))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options, path.display().to_string())
    }

    /// Open the database at the default per-user location.
    pub fn open_default() -> anyhow::Result<Self> {
        let path = config_db_path()?;
        Self::open(path)
    }

    /// Private in-memory database (tests/dev).
    pub fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory SQLite URL")?;
        Self::connect(options, ":memory:".to_string())
    }

    fn connect(options: SqliteConnectOptions, location: String) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rxdesk-config-db")
            .enable_all()
            .build()
            .context("failed to build runtime for config store")?;

        let pool = runtime.block_on(async {
            // One long-lived connection: keeps an in-memory database alive and
            // serialises writers.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .with_context(|| format!("failed to open config store at {location}"))?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS config (
                    key        TEXT PRIMARY KEY NOT NULL,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            )
            .execute(&pool)
            .await
            .context("failed to create config table")?;

            Ok::<_, anyhow::Error>(pool)
        })?;

        info!(location = %location, "config store opened");

        Ok(Self {
            pool: Mutex::new(Some(pool)),
            runtime,
            location,
        })
    }

    fn pool(&self) -> Result<SqlitePool, StoreError> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)
    }
}

impl ConfigStore for SqliteConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let pool = self.pool()?;
        let row = self
            .runtime
            .block_on(async {
                sqlx::query(
                    r#"
                    SELECT value
                    FROM config
                    WHERE key = ?1
                    "#,
                )
                .bind(key)
                .fetch_optional(&pool)
                .await
            })
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        match row {
            Some(row) => row
                .try_get::<String, _>("value")
                .map(Some)
                .map_err(|e| StoreError::Storage(e.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let pool = self.pool()?;
        let now = Utc::now().to_rfc3339();
        self.runtime
            .block_on(async {
                sqlx::query(
                    r#"
                    INSERT INTO config (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(key)
                    DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key)
                .bind(value)
                .bind(&now)
                .execute(&pool)
                .await
            })
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        debug!(key, "config entry written");
        Ok(())
    }

    fn close(&self) {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = pool {
            self.runtime.block_on(pool.close());
            info!(location = %self.location, "config store closed");
        }
    }
}

impl Drop for SqliteConfigStore {
    fn drop(&mut self) {
        // Close while the runtime is still alive.
        self.close();
    }
}

/// Resolve the path to the config database: `{app_data_dir}/rxdesk/config.db`.
pub fn config_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("rxdesk");
    path.push("config.db");
    Ok(path)
}
