//! Wiring of the responsiveness monitor onto the agent bus and loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rxdesk_events::{AgentBus, AgentEvent};
use rxdesk_infra::{LoopHandle, MonitorConfig, ResponsivenessMonitor};

/// Start the monitor and feed it from the loop every `feed_interval`.
///
/// Call once the blocking boot steps are done: the clock starts as if fed now,
/// so time spent before this call never counts as a stall.
pub fn start_watchdog(
    bus: Arc<AgentBus>,
    config: MonitorConfig,
    feed_interval: Duration,
    loop_handle: &LoopHandle,
) -> anyhow::Result<Arc<ResponsivenessMonitor>> {
    let monitor = Arc::new(
        ResponsivenessMonitor::start(
            config,
            Arc::new(move |stalled: Duration| {
                bus.emit(AgentEvent::Hung {
                    seconds: stalled.as_secs_f64(),
                })
            }),
        )
        .context("failed to start responsiveness monitor")?,
    );

    let feeder = monitor.clone();
    loop_handle
        .set_interval(feed_interval, move || feeder.feed())
        .context("interactive loop closed before the monitor could be fed")?;
    Ok(monitor)
}
