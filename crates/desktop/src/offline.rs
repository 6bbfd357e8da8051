//! Offline mode flag, persisted in the config store.

use std::sync::Arc;

use rxdesk_core::{AccessError, ConfigKey};
use rxdesk_infra::{ConfigStore, ConfigStoreExt};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Whether this session started without reaching the licensing backend.
///
/// Backed by the `offline_mode` config entry so screens read the same flag
/// the boot gate wrote.
#[derive(Clone)]
pub struct OfflineMode {
    store: Arc<dyn ConfigStore>,
}

impl OfflineMode {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn state(&self) -> ConnectivityState {
        if self.is_offline() {
            ConnectivityState::Offline
        } else {
            ConnectivityState::Online
        }
    }

    /// Mark the session as offline.
    pub fn set_offline(&self) {
        if self.store.put_bool(ConfigKey::OfflineMode, true) {
            info!("offline mode on");
        }
    }

    /// Mark the session as online.
    pub fn set_online(&self) {
        if self.store.put_bool(ConfigKey::OfflineMode, false) {
            info!("offline mode off");
        }
    }

    pub fn is_offline(&self) -> bool {
        self.store.get_bool(ConfigKey::OfflineMode, false)
    }

    /// Ensure the session is online; error if offline.
    pub fn require_online(&self) -> Result<(), AccessError> {
        if self.is_offline() {
            Err(AccessError::network("operation requires a connection to the licensing backend"))
        } else {
            Ok(())
        }
    }
}
