//! Durable key-value cache for the agent's config entries.
//!
//! Values are stored as strings and coerced on read. Read failures never
//! propagate to the caller: they are logged and the caller's default wins,
//! which for the access checks means "unregistered" and "expired".
//!
//! Writes are expected from the interactive thread only (task callbacks and
//! UI actions); workers hand results back instead of writing here.

pub mod in_memory;
pub mod sqlite;

use chrono::NaiveDate;
use rxdesk_core::AccessError;
use rxdesk_core::config_key::{ConfigKey, format_bool, format_date, parse_bool, parse_date};
use tracing::warn;

pub use in_memory::InMemoryConfigStore;
pub use sqlite::SqliteConfigStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("config store is closed")]
    Closed,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for AccessError {
    fn from(value: StoreError) -> Self {
        AccessError::store(value.to_string())
    }
}

/// Raw string key-value storage.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Flush and release any held handles. Later calls fail with `Closed`.
    fn close(&self) {}
}

/// Typed accessors over [`ConfigStore`] for the agent's own keys.
pub trait ConfigStoreExt: ConfigStore {
    /// Value for `key`, or `default` when missing or unreadable.
    fn get_or(&self, key: ConfigKey, default: &str) -> String {
        match self.get(key.as_str()) {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(err) => {
                warn!(key = %key, error = %err, "config read failed; using default");
                default.to_string()
            }
        }
    }

    /// Non-empty value for `key`, if any.
    fn get_opt(&self, key: ConfigKey) -> Option<String> {
        match self.get(key.as_str()) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(err) => {
                warn!(key = %key, error = %err, "config read failed");
                None
            }
        }
    }

    fn get_bool(&self, key: ConfigKey, default: bool) -> bool {
        match self.get_opt(key) {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(key = %key, value = %raw, "unparseable bool in config");
                default
            }),
            None => default,
        }
    }

    fn get_date(&self, key: ConfigKey) -> Option<NaiveDate> {
        let raw = self.get_opt(key)?;
        let parsed = parse_date(&raw);
        if parsed.is_none() {
            warn!(key = %key, value = %raw, "unparseable date in config");
        }
        parsed
    }

    /// Write `value`, logging failures. Returns whether the write landed.
    fn put(&self, key: ConfigKey, value: &str) -> bool {
        match self.set(key.as_str(), value) {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %key, error = %err, "config write failed");
                false
            }
        }
    }

    fn put_bool(&self, key: ConfigKey, value: bool) -> bool {
        self.put(key, format_bool(value))
    }

    fn put_date(&self, key: ConfigKey, value: NaiveDate) -> bool {
        self.put(key, &format_date(value))
    }
}

impl<S: ConfigStore + ?Sized> ConfigStoreExt for S {}
