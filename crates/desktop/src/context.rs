//! Shared handles built once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rxdesk_events::AgentBus;
use rxdesk_infra::{Clock, ConfigStore, LoopHandle, SqliteConfigStore, SystemClock, WorkerPool};
use tracing::info;

use crate::host::{HostControl, SystemHostControl};
use crate::offline::OfflineMode;
use crate::remote::{HttpAuthorityClient, RemoteAuthorityClient};
use crate::settings::AgentSettings;

/// How long an awaited call site waits for its pooled task by default.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything the guard, gate and validator share.
#[derive(Clone)]
pub struct AgentContext {
    pub store: Arc<dyn ConfigStore>,
    pub remote: Arc<dyn RemoteAuthorityClient>,
    pub pool: Arc<WorkerPool>,
    pub bus: Arc<AgentBus>,
    pub host: Arc<dyn HostControl>,
    pub clock: Arc<dyn Clock>,
    /// Upper bound for `submit_and_wait` call sites.
    pub wait_timeout: Duration,
}

impl AgentContext {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        remote: Arc<dyn RemoteAuthorityClient>,
        pool: Arc<WorkerPool>,
        host: Arc<dyn HostControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            remote,
            pool,
            bus: Arc::new(AgentBus::new()),
            host,
            clock,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Production wiring: SQLite config store, HTTP client, system clock.
    pub fn from_settings(settings: &AgentSettings, loop_handle: LoopHandle) -> anyhow::Result<Self> {
        let store: Arc<dyn ConfigStore> = match &settings.db_path {
            Some(path) => Arc::new(SqliteConfigStore::open(path)?),
            None => Arc::new(SqliteConfigStore::open_default()?),
        };
        let remote = Arc::new(
            HttpAuthorityClient::new(&settings.api).context("failed to create licensing client")?,
        );
        let pool = Arc::new(
            WorkerPool::new(settings.pool_config(), loop_handle).context("failed to start worker pool")?,
        );
        let host = Arc::new(SystemHostControl::new(store.clone()));

        info!(api = %settings.api.base_url, workers = pool.size(), "agent context ready");

        Ok(Self::new(store, remote, pool, host, Arc::new(SystemClock)))
    }

    pub fn offline_mode(&self) -> OfflineMode {
        OfflineMode::new(self.store.clone())
    }
}
