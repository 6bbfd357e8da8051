//! First-run registration, recorded locally once the backend has the record.

use chrono::NaiveDate;
use rxdesk_core::{AccessError, ConfigKey, InstallState, SystemId};
use rxdesk_infra::ConfigStoreExt;
use tracing::info;

use crate::context::AgentContext;
use crate::host::host_name;
use crate::remote::ActivationEvent;

/// Record a freshly registered installation and log the activation remotely.
///
/// The activation log is posted through the worker pool; its failure is
/// logged but does not undo the local registration.
pub fn register_installation(ctx: &AgentContext, system_id: &SystemId, expiry: NaiveDate) -> Result<(), AccessError> {
    ctx.offline_mode().require_online()?;

    let store = &ctx.store;
    let written = store.put(ConfigKey::SystemId, system_id.as_str())
        && store.put_bool(ConfigKey::AccountCreated, true)
        && store.put(ConfigKey::Status, InstallState::Active.as_str())
        && store.put_date(ConfigKey::ContractExpiry, expiry);
    if !written {
        return Err(AccessError::store("failed to record registration"));
    }
    info!(%system_id, %expiry, "installation registered");

    let remote = ctx.remote.clone();
    let id = system_id.clone();
    ctx.pool
        .spawn(move || remote.post_activation_log(ActivationEvent::Registered, &id, &host_name()));
    Ok(())
}
