//! Control over the machine the agent runs on.

use std::process::Command;
use std::sync::Arc;

use rxdesk_infra::ConfigStore;
use tracing::{error, info};

/// Side effects of a remote shutdown, in the order they are issued.
pub trait HostControl: Send + Sync {
    /// Flush and close every local storage handle.
    fn close_storage(&self);

    /// Ask the OS to power the machine off.
    fn power_off(&self) -> std::io::Result<()>;

    /// End this process.
    fn terminate(&self);
}

pub struct SystemHostControl {
    store: Arc<dyn ConfigStore>,
}

impl SystemHostControl {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

impl HostControl for SystemHostControl {
    fn close_storage(&self) {
        self.store.close();
    }

    fn power_off(&self) -> std::io::Result<()> {
        let (program, args) = shutdown_command();
        info!(program, ?args, "issuing OS shutdown");
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            error!(%status, "OS shutdown command failed");
            return Err(std::io::Error::other(format!("shutdown exited with {status}")));
        }
        Ok(())
    }

    fn terminate(&self) {
        info!("terminating agent process");
        std::process::exit(0);
    }
}

/// Program and arguments that power the host off.
pub fn shutdown_command() -> (&'static str, &'static [&'static str]) {
    const WINDOWS_ARGS: &[&str] = &["/s", "/t", "0"];
    const UNIX_ARGS: &[&str] = &["-h", "now"];
    if cfg!(windows) {
        ("shutdown", WINDOWS_ARGS)
    } else {
        ("shutdown", UNIX_ARGS)
    }
}

/// Best-effort machine name for activation logs.
pub fn host_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxdesk_infra::{InMemoryConfigStore, StoreError};

    #[test]
    fn shutdown_command_targets_platform() {
        let (program, args) = shutdown_command();
        assert_eq!(program, "shutdown");
        if cfg!(windows) {
            assert_eq!(args, ["/s", "/t", "0"]);
        } else {
            assert_eq!(args, ["-h", "now"]);
        }
    }

    #[test]
    fn close_storage_closes_the_config_store() {
        let store = Arc::new(InMemoryConfigStore::new());
        let host = SystemHostControl::new(store.clone());
        host.close_storage();
        assert!(matches!(store.get("status"), Err(StoreError::Closed)));
    }

    #[test]
    fn host_name_is_never_empty() {
        assert!(!host_name().is_empty());
    }
}
