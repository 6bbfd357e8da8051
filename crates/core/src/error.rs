//! Access-control error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type used across the access-control layer.
pub type AccessResult<T> = Result<T, AccessError>;

/// Access-control error.
///
/// Poll-loop callers treat every variant as "keep last-known-good state".
/// Only the one-shot boot checks turn these into a user-visible decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The licensing backend could not be reached (DNS, connect, timeout).
    /// Transient: retried on the next poll.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The licensing backend answered with a non-2xx status (or 401).
    #[error("remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// A shutdown command whose target lies outside the execution window.
    #[error("stale shutdown command for {target}")]
    StaleCommand { target: DateTime<Utc> },

    /// The local config cache could not be read or written.
    #[error("local store corrupt: {0}")]
    LocalStoreCorrupt(String),

    /// A value from the remote side or the cache failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (empty or malformed).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl AccessError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkUnavailable(msg.into())
    }

    pub fn rejected(status: u16, msg: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status,
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::LocalStoreCorrupt(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Whether the failure is expected to clear up on its own (retry next poll).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(AccessError::network("timeout").is_transient());
        assert!(!AccessError::rejected(401, "bad key").is_transient());
        assert!(!AccessError::store("disk").is_transient());
    }

    #[test]
    fn rejected_display_includes_status() {
        let err = AccessError::rejected(503, "maintenance");
        assert_eq!(err.to_string(), "remote rejected request (503): maintenance");
    }
}
