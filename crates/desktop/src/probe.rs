//! One-shot startup connectivity probe.
//!
//! Three steps, stopping at the first failure:
//! 1. raw TCP connect to any of the configured `host:port` targets,
//! 2. HTTP GET of a well-known URL, retried once without certificate
//!    verification if the first attempt failed on TLS,
//! 3. HTTP GET of the licensing backend, where 200 and 401 both count.

use std::error::Error as StdError;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::settings::ProbeSettings;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Network primitives the probe needs.
pub trait Transport: Send + Sync {
    /// Whether a TCP connection to `target` (`host:port`) opens within `timeout`.
    fn tcp_connect(&self, target: &str, timeout: Duration) -> bool;

    /// GET `url` and return the HTTP status code.
    fn http_get(&self, url: &str, timeout: Duration, verify_tls: bool) -> Result<u16, ProbeError>;
}

/// Real sockets and `reqwest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetTransport;

impl Transport for NetTransport {
    fn tcp_connect(&self, target: &str, timeout: Duration) -> bool {
        let addrs = match target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(addr = %target, error = %e, "could not resolve probe target");
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
    }

    fn http_get(&self, url: &str, timeout: Duration, verify_tls: bool) -> Result<u16, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        match client.get(url).send() {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(e) if is_tls_failure(&e) => Err(ProbeError::Tls(e.to_string())),
            Err(e) => Err(ProbeError::Request(e.to_string())),
        }
    }
}

/// Walk the error chain looking for a certificate or handshake failure.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        current = e.source();
    }
    false
}

pub struct ConnectivityProbe {
    transport: Arc<dyn Transport>,
    settings: ProbeSettings,
    backend_url: String,
}

impl ConnectivityProbe {
    pub fn new(transport: Arc<dyn Transport>, settings: ProbeSettings, backend_url: impl Into<String>) -> Self {
        Self {
            transport,
            settings,
            backend_url: backend_url.into(),
        }
    }

    /// Run all steps. Never fails; any error means unreachable.
    pub fn check(&self) -> bool {
        if !self.sockets_reachable() {
            info!("connectivity probe: no socket target reachable");
            return false;
        }
        if !self.internet_reachable() {
            info!("connectivity probe: internet endpoint unreachable");
            return false;
        }
        let reachable = self.backend_reachable();
        info!(reachable, "connectivity probe finished");
        reachable
    }

    pub fn sockets_reachable(&self) -> bool {
        let timeout = Duration::from_secs(self.settings.socket_timeout_secs);
        self.settings.socket_targets.iter().any(|target| {
            let ok = self.transport.tcp_connect(target, timeout);
            debug!(addr = %target, ok, "socket probe");
            ok
        })
    }

    pub fn internet_reachable(&self) -> bool {
        let timeout = Duration::from_secs(self.settings.http_timeout_secs);
        let url = &self.settings.http_url;
        match self.transport.http_get(url, timeout, true) {
            Ok(status) => {
                debug!(%url, status, "internet probe");
                true
            }
            Err(ProbeError::Tls(reason)) => {
                warn!(%url, %reason, "TLS verification failed; retrying without it");
                match self.transport.http_get(url, timeout, false) {
                    Ok(status) => {
                        debug!(%url, status, "internet probe (unverified)");
                        true
                    }
                    Err(e) => {
                        debug!(%url, error = %e, "internet probe failed");
                        false
                    }
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "internet probe failed");
                false
            }
        }
    }

    pub fn backend_reachable(&self) -> bool {
        let timeout = Duration::from_secs(self.settings.http_timeout_secs);
        match self.transport.http_get(&self.backend_url, timeout, true) {
            Ok(status) => {
                debug!(url = %self.backend_url, status, "backend probe");
                status == 200 || status == 401
            }
            Err(e) => {
                debug!(url = %self.backend_url, error = %e, "backend probe failed");
                false
            }
        }
    }
}
