mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::NaiveDate;
use common::{FakeTransport, Harness, status};
use rxdesk_core::{InstallState, LockReason, SystemId};
use rxdesk_desktop::{ConnectivityGate, DataIntegrity, RemoteError, Route, register_installation};
use rxdesk_events::{AgentEvent, EventBus};
use rxdesk_infra::InMemoryConfigStore;

fn intact() -> Arc<dyn DataIntegrity> {
    Arc::new(|| true)
}

fn gate(h: &Harness, transport: Arc<FakeTransport>, integrity: Arc<dyn DataIntegrity>) -> ConnectivityGate {
    ConnectivityGate::new(&h.ctx, h.probe(transport), integrity, h.guard())
}

#[test]
fn offline_boot_of_registered_install_enters_without_network() {
    let h = Harness::registered();
    let transport = Arc::new(FakeTransport::offline());

    let route = gate(&h, transport.clone(), intact()).route();

    assert_eq!(route, Route::Enter { offline: true });
    assert_eq!(h.remote.status_calls(), 0);
    assert_eq!(transport.http_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.config("offline_mode").as_deref(), Some("true"));
}

#[test]
fn offline_boot_requires_prior_activation() {
    let h = Harness::new(InMemoryConfigStore::new());
    let route = gate(&h, Arc::new(FakeTransport::offline()), intact()).route();
    assert_eq!(route, Route::ActivationRequired);
}

#[test]
fn offline_boot_with_damaged_data_is_refused() {
    let h = Harness::registered();
    let route = gate(&h, Arc::new(FakeTransport::offline()), Arc::new(|| false)).route();
    assert_eq!(route, Route::ActivationRequired);
}

#[test]
fn offline_boot_of_deactivated_install_stays_locked() {
    let h = Harness::new(
        InMemoryConfigStore::new()
            .with("system_id", common::SYSTEM_ID)
            .with("account_created", "true")
            .with("status", "deactivated"),
    );
    let route = gate(&h, Arc::new(FakeTransport::offline()), intact()).route();
    assert_eq!(
        route,
        Route::Locked {
            reason: LockReason::DEFAULT_REASON.to_string(),
            contact: None,
        }
    );
}

#[test]
fn online_first_run_goes_to_registration() {
    let h = Harness::new(InMemoryConfigStore::new().with("offline_mode", "true"));
    let route = gate(&h, Arc::new(FakeTransport::online()), intact()).route();

    assert_eq!(route, Route::Register);
    assert_eq!(h.remote.status_calls(), 0);
    assert_eq!(h.config("offline_mode").as_deref(), Some("false"));
}

#[test]
fn online_active_install_enters_and_persists_modules() {
    let h = Harness::registered();
    let events = h.ctx.bus.subscribe();
    let mut active = status(InstallState::Active);
    active.store_active = true;
    active.pharmacy_active = true;
    h.remote.push_status(active);

    let route = gate(&h, Arc::new(FakeTransport::online()), intact()).route();

    assert_eq!(route, Route::Enter { offline: false });
    assert_eq!(h.config("store_active").as_deref(), Some("true"));
    assert_eq!(h.config("pharmacy_active").as_deref(), Some("true"));
    assert!(events.drain().contains(&AgentEvent::ModulesChanged {
        store_active: true,
        pharmacy_active: true,
    }));
}

#[test]
fn online_deactivated_install_routes_to_locked_screen() {
    let h = Harness::registered();
    let mut deactivated = status(InstallState::Deactivated);
    deactivated.reason = Some("Licence suspended".into());
    deactivated.contact_info = Some("support@example.com".into());
    h.remote.push_status(deactivated);

    let route = gate(&h, Arc::new(FakeTransport::online()), intact()).route();

    assert_eq!(
        route,
        Route::Locked {
            reason: "Licence suspended".into(),
            contact: Some("support@example.com".into()),
        }
    );
    assert_eq!(h.config("status").as_deref(), Some("deactivated"));
}

#[test]
fn online_fetch_failure_falls_back_to_cache() {
    let h = Harness::registered();
    h.remote.push(Err(RemoteError::Network("reset by peer".into())));
    let route = gate(&h, Arc::new(FakeTransport::online()), intact()).route();
    assert_eq!(route, Route::Enter { offline: false });

    let h = Harness::new(
        InMemoryConfigStore::new()
            .with("system_id", common::SYSTEM_ID)
            .with("account_created", "true")
            .with("status", "deactivated"),
    );
    h.remote.push(Ok(None));
    let route = gate(&h, Arc::new(FakeTransport::online()), intact()).route();
    assert!(matches!(route, Route::Locked { .. }));
}

#[test]
fn registration_records_install_and_logs_activation() {
    let mut h = Harness::new(InMemoryConfigStore::new());
    let id = SystemId::new("PH-0099").unwrap();
    let expiry = NaiveDate::from_ymd_opt(2027, 10, 19).unwrap();

    register_installation(&h.ctx, &id, expiry).unwrap();

    assert_eq!(h.config("system_id").as_deref(), Some("PH-0099"));
    assert_eq!(h.config("account_created").as_deref(), Some("true"));
    assert_eq!(h.config("status").as_deref(), Some("active"));
    assert_eq!(h.config("contract_expiry").as_deref(), Some("2027-10-19"));

    let remote = h.remote.clone();
    h.run_until(|| !remote.logs.lock().unwrap().is_empty());
    assert_eq!(h.journal(), vec!["log:registered"]);
}

#[test]
fn registration_needs_connectivity() {
    let h = Harness::new(InMemoryConfigStore::new().with("offline_mode", "true"));
    let id = SystemId::new("PH-0099").unwrap();
    let expiry = NaiveDate::from_ymd_opt(2027, 10, 19).unwrap();

    assert!(register_installation(&h.ctx, &id, expiry).is_err());
    assert_eq!(h.config("system_id"), None);
}
