//! Startup routing: where the user lands when the application opens.

use std::sync::Arc;

use rxdesk_core::{ConfigKey, InstallState, LockReason, LockState};
use rxdesk_infra::{ConfigStore, ConfigStoreExt};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::guard::LicenseGuard;
use crate::probe::ConnectivityProbe;

/// Where the application should go after boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Normal entry.
    Enter { offline: bool },
    /// Remote deactivation; show the locked screen.
    Locked { reason: String, contact: Option<String> },
    /// First run: show registration.
    Register,
    /// Never activated and no connectivity.
    ActivationRequired,
}

impl Route {
    fn locked(reason: LockReason) -> Self {
        Route::Locked {
            reason: reason.reason,
            contact: reason.contact_info,
        }
    }
}

/// "Local data intact" check owned by the rest of the application.
pub trait DataIntegrity: Send + Sync {
    fn local_data_intact(&self) -> bool;
}

impl<F> DataIntegrity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn local_data_intact(&self) -> bool {
        self()
    }
}

/// Integrity check that only asks whether the config store is readable.
pub struct ConfigStoreIntegrity {
    store: Arc<dyn ConfigStore>,
}

impl ConfigStoreIntegrity {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

impl DataIntegrity for ConfigStoreIntegrity {
    fn local_data_intact(&self) -> bool {
        self.store.get(ConfigKey::SystemId.as_str()).is_ok()
    }
}

pub struct ConnectivityGate {
    ctx: AgentContext,
    probe: ConnectivityProbe,
    integrity: Arc<dyn DataIntegrity>,
    guard: LicenseGuard,
}

impl ConnectivityGate {
    pub fn new(
        ctx: &AgentContext,
        probe: ConnectivityProbe,
        integrity: Arc<dyn DataIntegrity>,
        guard: LicenseGuard,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            probe,
            integrity,
            guard,
        }
    }

    /// Decide the startup route. Blocks on the probe and, when online, on
    /// one status fetch.
    pub fn route(&self) -> Route {
        let route = if self.probe.check() {
            self.route_online()
        } else {
            self.route_offline()
        };
        info!(?route, "startup route decided");
        route
    }

    fn registered(&self) -> bool {
        let store = &self.ctx.store;
        store.get_opt(ConfigKey::SystemId).is_some() && store.get_bool(ConfigKey::AccountCreated, false)
    }

    fn cached_state(&self) -> InstallState {
        InstallState::parse(&self.ctx.store.get_or(ConfigKey::Status, ""))
    }

    fn route_offline(&self) -> Route {
        let offline = self.ctx.offline_mode();

        if !self.registered() {
            warn!("offline and never activated");
            return Route::ActivationRequired;
        }
        if self.cached_state() == InstallState::Deactivated {
            warn!("offline with a deactivated installation");
            return Route::locked(LockReason {
                reason: LockReason::DEFAULT_REASON.to_string(),
                contact_info: None,
            });
        }
        if !self.integrity.local_data_intact() {
            warn!("offline and local data failed its integrity check");
            return Route::ActivationRequired;
        }

        offline.set_offline();
        Route::Enter { offline: true }
    }

    fn route_online(&self) -> Route {
        self.ctx.offline_mode().set_online();

        if !self.registered() {
            return Route::Register;
        }

        let boot = self.guard.boot_check();
        if boot.fetched {
            return match boot.lock {
                LockState::Locked(reason) => Route::locked(reason),
                LockState::Unlocked => Route::Enter { offline: false },
            };
        }

        // Fall back to the last state the backend told us.
        match self.cached_state() {
            InstallState::Deactivated => Route::locked(LockReason {
                reason: LockReason::DEFAULT_REASON.to_string(),
                contact_info: None,
            }),
            _ => Route::Enter { offline: false },
        }
    }
}
