//! License guard: periodic status poll, lock edges, remote shutdown.
//!
//! The guard runs on the interactive loop. Each tick hands one status fetch
//! to the worker pool; the result comes back as a loop callback, which is the
//! only place config entries and in-memory state are updated. Polls are
//! single-flight: a tick while a fetch is outstanding is skipped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rxdesk_core::{
    AccessError, ConfigKey, InstallState, InstallationStatus, LockState, LockTransition, ShutdownCountdown,
    ShutdownPlanner, SystemId,
};
use rxdesk_events::AgentEvent;
use rxdesk_infra::{Completion, ConfigStoreExt, LoopClosed, LoopHandle, TaskError, TimerId};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::context::AgentContext;
use crate::host::host_name;
use crate::remote::{ActivationEvent, RemoteError};

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How long the shutdown path waits for its best-effort notifications.
const SHUTDOWN_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of the startup status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootCheck {
    pub lock: LockState,
    /// False when the backend was unreachable or had no record.
    pub fetched: bool,
}

#[derive(Default)]
struct GuardState {
    lock: LockState,
    planner: ShutdownPlanner,
    polling: bool,
    shutting_down: bool,
    timer: Option<(LoopHandle, TimerId)>,
}

struct Inner {
    ctx: AgentContext,
    state: Mutex<GuardState>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LicenseGuard {
    inner: Arc<Inner>,
}

impl LicenseGuard {
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: ctx.clone(),
                state: Mutex::new(GuardState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ctx(&self) -> &AgentContext {
        &self.inner.ctx
    }

    pub fn lock_state(&self) -> LockState {
        self.state().lock.clone()
    }

    pub fn countdown(&self) -> ShutdownCountdown {
        self.state().planner.current()
    }

    /// Whether a poll is in flight.
    pub fn is_polling(&self) -> bool {
        self.state().polling
    }

    /// Start polling every `period` on the loop. No-op if already started.
    pub fn start(&self, loop_handle: &LoopHandle, period: Duration) -> Result<(), LoopClosed> {
        if self.state().timer.is_some() {
            return Ok(());
        }
        let guard = self.clone();
        let timer = loop_handle.set_interval(period, move || guard.poll_now())?;
        self.state().timer = Some((loop_handle.clone(), timer));
        info!(?period, "license polling started");
        Ok(())
    }

    pub fn stop(&self) {
        if let Some((handle, timer)) = self.state().timer.take() {
            handle.cancel(timer);
            info!("license polling stopped");
        }
    }

    /// Poll now unless a poll is already in flight.
    pub fn poll_now(&self) {
        let Some(system_id) = self.system_id() else {
            debug!("not registered; skipping license poll");
            return;
        };

        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            if state.polling {
                debug!("license poll still in flight; skipping tick");
                return;
            }
            state.polling = true;
        }

        let remote = self.ctx().remote.clone();
        let on_success = self.clone();
        let on_error = self.clone();
        self.ctx().pool.submit(
            move || remote.get_status(&system_id),
            Completion::new()
                .on_success(move |status: Option<InstallationStatus>| {
                    on_success.state().polling = false;
                    match status {
                        Some(status) => on_success.apply_status(&status),
                        None => warn!("backend has no record for this installation; keeping last state"),
                    }
                })
                .on_error(move |err: TaskError<RemoteError>| {
                    on_error.state().polling = false;
                    log_poll_failure(err);
                }),
        );
    }

    /// One inline fetch at startup, then the normal status handling.
    ///
    /// Fails open: if the backend cannot be asked, the current (unlocked at
    /// boot) state stands.
    pub fn boot_check(&self) -> BootCheck {
        let Some(system_id) = self.system_id() else {
            return BootCheck {
                lock: self.lock_state(),
                fetched: false,
            };
        };

        let remote = self.ctx().remote.clone();
        let fetched = self
            .ctx()
            .pool
            .submit_and_wait(move || remote.get_status(&system_id), self.ctx().wait_timeout);

        match fetched {
            Ok(Some(status)) => {
                self.apply_status(&status);
                BootCheck {
                    lock: self.lock_state(),
                    fetched: true,
                }
            }
            Ok(None) => {
                warn!("backend has no record for this installation; allowing boot");
                BootCheck {
                    lock: self.lock_state(),
                    fetched: false,
                }
            }
            Err(err) => {
                log_poll_failure(err);
                info!("boot status check failed; allowing boot");
                BootCheck {
                    lock: self.lock_state(),
                    fetched: false,
                }
            }
        }
    }

    /// Handle one successful poll. Runs on the interactive thread.
    pub fn apply_status(&self, status: &InstallationStatus) {
        self.persist(status);

        let transition = {
            let mut state = self.state();
            let transition = state.lock.observe(status);
            if let Some(transition) = &transition {
                state.lock.apply(transition);
            }
            transition
        };
        match transition {
            Some(LockTransition::Lock(reason)) => {
                warn!(system_id = %status.system_id, reason = %reason.reason, "installation locked");
                self.ctx().bus.emit(AgentEvent::locked(&reason));
            }
            Some(LockTransition::Unlock) => {
                info!(system_id = %status.system_id, "installation unlocked");
                self.ctx().bus.emit(AgentEvent::Unlocked);
            }
            None => {}
        }

        self.ctx().bus.emit(AgentEvent::ModulesChanged {
            store_active: status.store_active,
            pharmacy_active: status.pharmacy_active,
        });

        self.handle_shutdown(status);
    }

    fn persist(&self, status: &InstallationStatus) {
        let store = &self.ctx().store;
        if status.status != InstallState::Unknown {
            store.put(ConfigKey::Status, status.status.as_str());
        }
        store.put_bool(ConfigKey::StoreActive, status.store_active);
        store.put_bool(ConfigKey::PharmacyActive, status.pharmacy_active);
        if let Some(expiry) = status.contract_expiry_date() {
            store.put_date(ConfigKey::ContractExpiry, expiry);
        }
    }

    fn handle_shutdown(&self, status: &InstallationStatus) {
        let command = match status.shutdown_command() {
            Ok(command) => command,
            Err(err) => {
                warn!(error = %err, "ignoring malformed shutdown command");
                return;
            }
        };

        let now = self.ctx().clock.now();
        let decision = self.state().planner.evaluate(command, now);

        if let Some(target) = decision.write_back {
            self.write_back_target(&status.system_id, target);
        }
        if let Some(target) = decision.stale {
            let err = AccessError::StaleCommand { target };
            warn!(error = %err, "ignoring stale shutdown command");
        }
        match decision.countdown {
            ShutdownCountdown::Pending(target) if decision.announce => {
                info!(%target, "shutdown countdown started");
                self.ctx().bus.emit(AgentEvent::ShutdownCountdownStarted { target });
            }
            ShutdownCountdown::Executing(target) => self.execute_shutdown(&status.system_id, target),
            _ => {}
        }
    }

    /// Replace a relative marker on the backend with the absolute target.
    fn write_back_target(&self, system_id: &SystemId, target: DateTime<Utc>) {
        let remote = self.ctx().remote.clone();
        let id = system_id.clone();
        let mut fields = Map::new();
        fields.insert("shutdown_time".to_string(), Value::String(target.to_rfc3339()));
        debug!(%target, "writing rebased shutdown target back");
        self.ctx()
            .pool
            .spawn(move || remote.patch_installation(&id, fields));
    }

    fn execute_shutdown(&self, system_id: &SystemId, target: DateTime<Utc>) {
        warn!(%target, "executing remote shutdown");
        self.state().shutting_down = true;
        self.stop();

        let ctx = self.ctx();
        ctx.host.close_storage();

        let remote = ctx.remote.clone();
        let id = system_id.clone();
        let notified = ctx.pool.submit_and_wait(
            move || {
                let mut fields = Map::new();
                fields.insert("shutdown_time".to_string(), Value::Null);
                let cleared = remote.patch_installation(&id, fields);
                let logged = remote.post_activation_log(ActivationEvent::ShutdownExecuted, &id, &host_name());
                cleared.and(logged)
            },
            SHUTDOWN_NOTIFY_TIMEOUT,
        );
        if let Err(err) = notified {
            warn!(error = %err, "could not notify backend of shutdown");
        }

        if let Err(err) = ctx.host.power_off() {
            error!(error = %err, "OS shutdown failed");
        }
        ctx.host.terminate();
    }

    fn system_id(&self) -> Option<SystemId> {
        let raw = self.ctx().store.get_opt(ConfigKey::SystemId)?;
        match SystemId::new(raw) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "cached system id is invalid");
                None
            }
        }
    }
}

fn log_poll_failure(err: TaskError<RemoteError>) {
    match err {
        TaskError::Failed(e) => match AccessError::from(e) {
            err @ AccessError::NetworkUnavailable(_) => debug!(error = %err, "license poll failed"),
            err => warn!(error = %err, "license poll rejected"),
        },
        TaskError::Panicked(msg) => error!(panic = %msg, "license poll panicked"),
        other => warn!(error = %other, "license poll did not complete"),
    }
}
