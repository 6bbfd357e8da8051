//! Responsiveness monitor (interactive-thread watchdog).
//!
//! The interactive thread calls [`ResponsivenessMonitor::feed`] on a timer. A
//! separate thread checks how long ago the last feed was and reports a stall
//! once per stall through the `on_hung` callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Called from the monitor thread with the stall length observed so far.
pub type HungHandler = Arc<dyn Fn(Duration) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Stall length that counts as hung.
    pub timeout: Duration,
    /// How often the monitor thread checks.
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            check_interval: Duration::from_millis(500),
        }
    }
}

struct Shared {
    epoch: Instant,
    /// Nanoseconds since `epoch` at the last feed.
    last_feed: AtomicU64,
}

impl Shared {
    fn since_last_feed(&self) -> Duration {
        let fed_at = self.epoch + Duration::from_nanos(self.last_feed.load(Ordering::Acquire));
        Instant::now().saturating_duration_since(fed_at)
    }
}

pub struct ResponsivenessMonitor {
    shared: Arc<Shared>,
    stop: Mutex<Option<mpsc::Sender<()>>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ResponsivenessMonitor {
    /// Start the monitor thread. The clock starts as if fed just now.
    pub fn start(config: MonitorConfig, on_hung: HungHandler) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            epoch: Instant::now(),
            last_feed: AtomicU64::new(0),
        });
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_shared = shared.clone();
        let join = thread::Builder::new()
            .name("responsiveness-monitor".to_string())
            .spawn(move || monitor_loop(&thread_shared, config, &stop_rx, on_hung))
            .map_err(|e| anyhow::anyhow!("failed to spawn responsiveness monitor: {e}"))?;

        info!(timeout = ?config.timeout, interval = ?config.check_interval, "responsiveness monitor started");

        Ok(Self {
            shared,
            stop: Mutex::new(Some(stop_tx)),
            join: Mutex::new(Some(join)),
        })
    }

    /// Record that the interactive thread is alive. Lock-free.
    pub fn feed(&self) {
        let nanos = self.shared.epoch.elapsed().as_nanos() as u64;
        self.shared.last_feed.store(nanos, Ordering::Release);
    }

    /// Stop the monitor thread. Idempotent.
    pub fn stop(&self) {
        let stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner).take();
        if stop.is_none() {
            return;
        }
        drop(stop);
        if let Some(join) = self.join.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = join.join();
        }
        info!("responsiveness monitor stopped");
    }
}

impl Drop for ResponsivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(shared: &Shared, config: MonitorConfig, stop: &mpsc::Receiver<()>, on_hung: HungHandler) {
    let mut stalled = false;
    loop {
        match stop.recv_timeout(config.check_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            // Sender dropped or explicit stop.
            _ => break,
        }

        let since = shared.since_last_feed();
        if since > config.timeout {
            if !stalled {
                stalled = true;
                warn!(stalled_secs = since.as_secs_f64(), "interactive thread is not responding");
                on_hung(since);
            }
        } else if stalled {
            stalled = false;
            info!("interactive thread responsive again");
        } else {
            debug!(since_ms = since.as_millis() as u64, "interactive thread ok");
        }
    }
}
