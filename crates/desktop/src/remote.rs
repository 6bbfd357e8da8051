//! Client for the remote licensing authority.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use rxdesk_core::{AccessError, InstallationStatus, SystemId};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::settings::ApiSettings;

/// Entry kinds written to the authority's activation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEvent {
    Registered,
    ShutdownExecuted,
}

impl ActivationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationEvent::Registered => "registered",
            ActivationEvent::ShutdownExecuted => "shutdown_executed",
        }
    }
}

impl core::fmt::Display for ActivationEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<RemoteError> for AccessError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::Network(msg) => AccessError::network(msg),
            RemoteError::Api(status, msg) => AccessError::rejected(status, msg),
            RemoteError::Parse(msg) => AccessError::validation(msg),
        }
    }
}

/// The licensing backend, as seen by the agent.
///
/// Calls block; callers run them on the worker pool.
pub trait RemoteAuthorityClient: Send + Sync {
    /// Current record for `system_id`, or `None` if the backend has none.
    fn get_status(&self, system_id: &SystemId) -> Result<Option<InstallationStatus>, RemoteError>;

    /// Overwrite the given fields of the installation record.
    fn patch_installation(&self, system_id: &SystemId, fields: Map<String, Value>) -> Result<(), RemoteError>;

    fn post_activation_log(&self, event: ActivationEvent, system_id: &SystemId, host: &str) -> Result<(), RemoteError>;
}

/// REST implementation over `reqwest`'s blocking client.
pub struct HttpAuthorityClient {
    client: Client,
    base_url: String,
    api_key: String,
    status_timeout: Duration,
    write_timeout: Duration,
}

impl core::fmt::Debug for HttpAuthorityClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HttpAuthorityClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpAuthorityClient {
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client for licensing backend")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            status_timeout: Duration::from_secs(settings.status_timeout_secs),
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
        })
    }

    fn installation_url(&self, system_id: &SystemId) -> String {
        format!("{}/installations/{}", self.base_url, system_id)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    fn send(req: RequestBuilder) -> Result<Response, RemoteError> {
        req.send().map_err(|e| RemoteError::Network(e.to_string()))
    }

    fn require_success(resp: Response) -> Result<Response, RemoteError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(RemoteError::Api(
                resp.status().as_u16(),
                resp.text().unwrap_or_default(),
            ))
        }
    }
}

impl RemoteAuthorityClient for HttpAuthorityClient {
    fn get_status(&self, system_id: &SystemId) -> Result<Option<InstallationStatus>, RemoteError> {
        let url = self.installation_url(system_id);
        debug!(%url, "fetching installation status");

        let resp = Self::send(self.authed(self.client.get(&url)).timeout(self.status_timeout))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::require_success(resp)?;

        let status: InstallationStatus = resp
            .json()
            .map_err(|e| RemoteError::Parse(format!("failed to parse installation status: {e}")))?;
        Ok(Some(status))
    }

    fn patch_installation(&self, system_id: &SystemId, fields: Map<String, Value>) -> Result<(), RemoteError> {
        let url = self.installation_url(system_id);
        debug!(%url, fields = fields.len(), "patching installation");

        let req = self
            .authed(self.client.patch(&url))
            .timeout(self.write_timeout)
            .json(&Value::Object(fields));
        Self::require_success(Self::send(req)?)?;
        Ok(())
    }

    fn post_activation_log(&self, event: ActivationEvent, system_id: &SystemId, host: &str) -> Result<(), RemoteError> {
        let url = format!("{}/activation_logs", self.base_url);
        let body = json!({
            "event": event.as_str(),
            "system_id": system_id.as_str(),
            "host": host,
            "at": Utc::now().to_rfc3339(),
        });
        debug!(%url, %event, "posting activation log");

        let req = self
            .authed(self.client.post(&url))
            .timeout(self.write_timeout)
            .json(&body);
        Self::require_success(Self::send(req)?)?;
        Ok(())
    }
}
