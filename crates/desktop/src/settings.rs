//! Agent settings: defaults, then an optional TOML file, then environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rxdesk_infra::{MonitorConfig, WorkerPoolConfig};
use rxdesk_observability::LogFormat;
use serde::Deserialize;
use tracing::{debug, warn};

/// File read when `RXDESK_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "rxdesk.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub api: ApiSettings,
    pub probe: ProbeSettings,
    pub monitor: MonitorSettings,
    /// Seconds between license polls.
    pub poll_interval_secs: u64,
    pub workers: usize,
    /// Config database; `None` means the per-user default location.
    pub db_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub status_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// `host:port` pairs tried with a raw TCP connect.
    pub socket_targets: Vec<String>,
    pub http_url: String,
    pub socket_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub timeout_ms: u64,
    pub check_interval_ms: u64,
    /// How often the interactive thread feeds the monitor.
    pub feed_interval_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            probe: ProbeSettings::default(),
            monitor: MonitorSettings::default(),
            poll_interval_secs: crate::guard::DEFAULT_POLL_INTERVAL.as_secs(),
            workers: 4,
            db_path: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321/rest/v1".to_string(),
            api_key: String::new(),
            status_timeout_secs: 10,
            write_timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            socket_targets: vec!["1.1.1.1:53".to_string(), "8.8.8.8:53".to_string()],
            http_url: "https://www.google.com".to_string(),
            socket_timeout_secs: 3,
            http_timeout_secs: 5,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            check_interval_ms: 500,
            feed_interval_ms: 1_000,
        }
    }
}

impl AgentSettings {
    /// Load settings for the running process.
    ///
    /// Reads `.env` (if present), then the TOML file named by `RXDESK_CONFIG`
    /// or `rxdesk.toml` in the working directory (if present), then applies
    /// `RXDESK_*` overrides from the environment.
    pub fn load() -> anyhow::Result<Self> {
        // Non-fatal: variables can be set externally.
        dotenvy::dotenv().ok();

        let explicit = std::env::var("RXDESK_CONFIG").ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_FILE));

        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            if explicit.is_some() {
                anyhow::bail!("config file {:?} named by RXDESK_CONFIG does not exist", path);
            }
            debug!(path = ?path, "no config file; using defaults");
            Self::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        debug!(path = ?path, "loading settings");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `RXDESK_*` overrides looked up through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RXDESK_API_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = lookup("RXDESK_API_KEY") {
            self.api.api_key = key;
        }
        if let Some(raw) = lookup("RXDESK_POLL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.poll_interval_secs = secs,
                _ => warn!(value = %raw, "ignoring invalid RXDESK_POLL_SECS"),
            }
        }
        if let Some(raw) = lookup("RXDESK_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.workers = n,
                Err(_) => warn!(value = %raw, "ignoring invalid RXDESK_WORKERS"),
            }
        }
        if let Some(path) = lookup("RXDESK_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = Some(PathBuf::from(path));
            }
        }
        if let Some(raw) = lookup("RXDESK_LOG_JSON") {
            match rxdesk_core::config_key::parse_bool(&raw) {
                Some(true) => self.log_format = LogFormat::Json,
                Some(false) => self.log_format = LogFormat::Pretty,
                None => warn!(value = %raw, "ignoring invalid RXDESK_LOG_JSON"),
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default().with_size(self.workers)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            timeout: Duration::from_millis(self.monitor.timeout_ms),
            check_interval: Duration::from_millis(self.monitor.check_interval_ms),
        }
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.feed_interval_ms.max(1))
    }
}
