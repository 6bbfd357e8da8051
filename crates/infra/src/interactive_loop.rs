//! The interactive thread's task queue and timers.
//!
//! Everything that touches UI-owned state runs here: worker callbacks, the
//! license poll tick, the monitor feed. Other threads only ever hold a
//! [`LoopHandle`] and post closures to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

/// A closure queued for the interactive thread.
pub type LoopTask = Box<dyn FnOnce() + Send>;

type TimerCallback = Box<dyn FnMut() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

enum LoopMessage {
    Task(LoopTask),
    AddTimer {
        id: TimerId,
        period: Duration,
        callback: TimerCallback,
    },
    CancelTimer(TimerId),
    Quit,
}

#[derive(Debug, thiserror::Error)]
#[error("interactive loop has shut down")]
pub struct LoopClosed;

/// Cloneable, thread-safe handle for posting work to the loop.
#[derive(Clone)]
pub struct LoopHandle {
    sender: mpsc::Sender<LoopMessage>,
    owner: ThreadId,
    next_timer: Arc<AtomicU64>,
}

impl core::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoopHandle").field("owner", &self.owner).finish()
    }
}

impl LoopHandle {
    /// Queue `task` to run on the interactive thread (FIFO).
    pub fn post<F>(&self, task: F) -> Result<(), LoopClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(LoopMessage::Task(Box::new(task)))
            .map_err(|_| LoopClosed)
    }

    /// Run `callback` on the interactive thread every `period`.
    ///
    /// The first tick happens one `period` after the loop picks this up.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> Result<TimerId, LoopClosed>
    where
        F: FnMut() + Send + 'static,
    {
        let id = TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed));
        self.sender
            .send(LoopMessage::AddTimer {
                id,
                period,
                callback: Box::new(callback),
            })
            .map_err(|_| LoopClosed)?;
        Ok(id)
    }

    pub fn cancel(&self, timer: TimerId) {
        let _ = self.sender.send(LoopMessage::CancelTimer(timer));
    }

    /// Ask the loop to return from `run`.
    pub fn quit(&self) {
        let _ = self.sender.send(LoopMessage::Quit);
    }

    /// Whether the caller is on the thread that owns the loop.
    pub fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

struct Timer {
    id: TimerId,
    period: Duration,
    next_due: Instant,
    callback: TimerCallback,
}

/// Single-threaded event loop owned by the interactive thread.
///
/// Not `Sync`; create it on the thread that will drive it.
pub struct InteractiveLoop {
    receiver: mpsc::Receiver<LoopMessage>,
    handle: LoopHandle,
    timers: Vec<Timer>,
    quit: bool,
}

impl InteractiveLoop {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            receiver,
            handle: LoopHandle {
                sender,
                owner: thread::current().id(),
                next_timer: Arc::new(AtomicU64::new(1)),
            },
            timers: Vec::new(),
            quit: false,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run until [`LoopHandle::quit`] is called.
    pub fn run(&mut self) {
        debug!("interactive loop running");
        self.drive(None, &mut || false);
        debug!("interactive loop stopped");
    }

    /// Run for `duration`, then return.
    pub fn run_for(&mut self, duration: Duration) {
        self.drive(Some(Instant::now() + duration), &mut || false);
    }

    /// Run until `done` returns true or `timeout` elapses.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&mut self, mut done: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        self.drive(Some(Instant::now() + timeout), &mut done)
    }

    /// Process everything already queued and any due timers, without blocking.
    pub fn pump(&mut self) {
        self.fire_due_timers();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => self.dispatch(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn drive(&mut self, deadline: Option<Instant>, done: &mut dyn FnMut() -> bool) -> bool {
        self.quit = false;
        loop {
            if done() {
                return true;
            }
            if self.quit {
                return false;
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return false;
            }

            self.fire_due_timers();

            let next_timer = self.timers.iter().map(|t| t.next_due).min();
            let wake_at = match (next_timer, deadline) {
                (Some(t), Some(d)) => Some(t.min(d)),
                (Some(t), None) => Some(t),
                (None, d) => d,
            };

            let message = match wake_at {
                Some(at) => {
                    let wait = at.saturating_duration_since(Instant::now());
                    match self.receiver.recv_timeout(wait) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        // The loop holds its own sender, so this is unreachable in practice.
                        Err(RecvTimeoutError::Disconnected) => return false,
                    }
                }
                None => match self.receiver.recv() {
                    Ok(message) => message,
                    Err(_) => return false,
                },
            };
            self.dispatch(message);
        }
    }

    fn dispatch(&mut self, message: LoopMessage) {
        match message {
            LoopMessage::Task(task) => task(),
            LoopMessage::AddTimer {
                id,
                period,
                callback,
            } => {
                if period.is_zero() {
                    warn!(timer = ?id, "ignoring zero-period timer");
                    return;
                }
                trace!(timer = ?id, ?period, "timer registered");
                self.timers.push(Timer {
                    id,
                    period,
                    next_due: Instant::now() + period,
                    callback,
                });
            }
            LoopMessage::CancelTimer(id) => {
                self.timers.retain(|t| t.id != id);
                trace!(timer = ?id, "timer cancelled");
            }
            LoopMessage::Quit => self.quit = true,
        }
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        for timer in self.timers.iter_mut() {
            if timer.next_due <= now {
                (timer.callback)();
                // A slow callback skips missed ticks instead of bursting.
                timer.next_due = Instant::now() + timer.period;
            }
        }
    }
}

impl Default for InteractiveLoop {
    fn default() -> Self {
        Self::new()
    }
}
