//! Headless agent: boots the access checks and runs the interactive loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rxdesk_desktop::{
    AgentContext, AgentSettings, ConfigStoreIntegrity, ConnectivityGate, ConnectivityProbe, ContractValidator,
    LicenseGuard, NetTransport, Route, start_watchdog,
};
use rxdesk_events::EventBus;
use rxdesk_infra::InteractiveLoop;
use tracing::{error, info, warn};

const EVENT_LOG_INTERVAL: Duration = Duration::from_millis(250);
const POOL_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let settings = AgentSettings::load().context("failed to load agent settings")?;
    rxdesk_observability::init(settings.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "rxdesk agent starting");

    let mut event_loop = InteractiveLoop::new();
    let handle = event_loop.handle();
    let ctx = AgentContext::from_settings(&settings, handle.clone())?;

    let events = ctx.bus.subscribe();
    handle.set_interval(EVENT_LOG_INTERVAL, move || {
        for event in events.drain() {
            info!(event = event.name(), payload = ?event, "agent event");
        }
    })?;

    let guard = LicenseGuard::new(&ctx);
    let probe = ConnectivityProbe::new(
        Arc::new(NetTransport),
        settings.probe.clone(),
        settings.api.base_url.clone(),
    );
    let gate = ConnectivityGate::new(
        &ctx,
        probe,
        Arc::new(ConfigStoreIntegrity::new(ctx.store.clone())),
        guard.clone(),
    );

    let run = match gate.route() {
        Route::Enter { offline } => {
            let verdict = ContractValidator::new(&ctx).validate();
            if verdict.valid {
                info!(offline, expiry = ?verdict.expiry, "access granted");
                true
            } else {
                error!(expiry = ?verdict.expiry, "contract expired; access denied");
                false
            }
        }
        Route::Locked { reason, contact } => {
            warn!(%reason, contact = ?contact, "installation locked; waiting for reactivation");
            true
        }
        Route::Register => {
            warn!("installation is not registered; complete first-run registration");
            false
        }
        Route::ActivationRequired => {
            error!("activation requires a connection to the licensing backend");
            false
        }
    };

    if run {
        // Boot routing blocks the loop thread on purpose; watch only from here on.
        let monitor = start_watchdog(ctx.bus.clone(), settings.monitor_config(), settings.feed_interval(), &handle)?;

        guard.start(&handle, settings.poll_interval())?;
        guard.poll_now();
        event_loop.run();
        monitor.stop();
    }

    guard.stop();
    ctx.pool.shutdown(POOL_SHUTDOWN_GRACE);
    ctx.store.close();
    info!("rxdesk agent stopped");
    Ok(())
}
