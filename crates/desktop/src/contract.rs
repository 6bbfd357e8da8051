//! Contract expiry check: local first, one online refresh when expired.

use chrono::NaiveDate;
use rxdesk_core::{AccessError, ConfigKey, SystemId};
use rxdesk_infra::{ConfigStoreExt, TaskError};
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::remote::RemoteError;

/// Outcome of a contract check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractVerdict {
    pub valid: bool,
    /// Expiry date after the check (refreshed or cached).
    pub expiry: Option<NaiveDate>,
    /// Whether the date came from the backend during this check.
    pub refreshed: bool,
}

impl ContractVerdict {
    fn invalid(expiry: Option<NaiveDate>) -> Self {
        Self {
            valid: false,
            expiry,
            refreshed: false,
        }
    }
}

pub struct ContractValidator {
    ctx: AgentContext,
}

impl ContractValidator {
    pub fn new(ctx: &AgentContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Check the cached expiry; refresh it from the backend if it has passed.
    ///
    /// Fails closed: a missing date, an unreachable backend or an unextended
    /// contract are all invalid. Blocks the caller while the refresh runs on
    /// the worker pool.
    pub fn validate(&self) -> ContractVerdict {
        let today = self.ctx.clock.today();

        let Some(cached) = self.ctx.store.get_date(ConfigKey::ContractExpiry) else {
            warn!("no usable contract expiry cached");
            return ContractVerdict::invalid(None);
        };

        if cached >= today {
            debug!(%cached, "contract valid");
            return ContractVerdict {
                valid: true,
                expiry: Some(cached),
                refreshed: false,
            };
        }

        let Some(system_id) = self
            .ctx
            .store
            .get_opt(ConfigKey::SystemId)
            .and_then(|raw| SystemId::new(raw).ok())
        else {
            warn!(%cached, "contract expired and installation is not registered");
            return ContractVerdict::invalid(Some(cached));
        };

        info!(%cached, %system_id, "contract expired; checking for renewal");
        let remote = self.ctx.remote.clone();
        let id = system_id.clone();
        let fetched = self
            .ctx
            .pool
            .submit_and_wait(move || remote.get_status(&id), self.ctx.wait_timeout);

        let remote_expiry = match fetched {
            Ok(Some(status)) => status.contract_expiry_date(),
            Ok(None) => {
                warn!(%system_id, "backend has no record for this installation");
                return ContractVerdict::invalid(Some(cached));
            }
            Err(err) => {
                log_refresh_failure(err);
                return ContractVerdict::invalid(Some(cached));
            }
        };

        match remote_expiry {
            Some(renewed) if renewed > cached => {
                self.ctx.store.put_date(ConfigKey::ContractExpiry, renewed);
                let valid = renewed >= today;
                info!(%renewed, valid, "contract expiry refreshed");
                ContractVerdict {
                    valid,
                    expiry: Some(renewed),
                    refreshed: true,
                }
            }
            _ => {
                warn!(%cached, "contract not extended");
                ContractVerdict::invalid(Some(cached))
            }
        }
    }
}

fn log_refresh_failure(err: TaskError<RemoteError>) {
    match err {
        TaskError::Failed(e) => {
            let err = AccessError::from(e);
            if err.is_transient() {
                info!(error = %err, "contract refresh failed: backend unreachable");
            } else {
                warn!(error = %err, "contract refresh rejected");
            }
        }
        other => warn!(error = %other, "contract refresh did not complete"),
    }
}
