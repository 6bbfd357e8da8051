//! Remote shutdown countdown.
//!
//! A shutdown target is only acted on inside two windows around it:
//!
//! ```text
//!        stale         execute           countdown           not due
//!  ──────────────|─────────────────|──────────────────|──────────────────▶ target − now
//!            −10min                0               +10min
//! ```
//!
//! Both boundaries at ±10 minutes are inclusive on the side closest to the
//! target; exactly `target` executes.

use chrono::{DateTime, Duration, Utc};

use crate::installation::ShutdownTime;

/// How far ahead of the target the countdown is shown.
pub const COUNTDOWN_WINDOW_MINUTES: i64 = 10;
/// How long after the target a late client may still execute.
pub const EXECUTION_GRACE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownCountdown {
    #[default]
    Idle,
    Pending(DateTime<Utc>),
    Executing(DateTime<Utc>),
}

/// Where a target sits relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownWindow {
    NotDue,
    Countdown,
    Execute,
    Stale,
}

impl ShutdownWindow {
    pub fn classify(target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = target - now;
        if remaining > Duration::minutes(COUNTDOWN_WINDOW_MINUTES) {
            ShutdownWindow::NotDue
        } else if remaining > Duration::zero() {
            ShutdownWindow::Countdown
        } else if remaining >= -Duration::minutes(EXECUTION_GRACE_MINUTES) {
            ShutdownWindow::Execute
        } else {
            ShutdownWindow::Stale
        }
    }
}

/// What the guard should do after one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownDecision {
    pub countdown: ShutdownCountdown,
    /// Surface the countdown UI (first sighting of this target).
    pub announce: bool,
    /// A relative marker was rebased; write this absolute target back.
    pub write_back: Option<DateTime<Utc>>,
    /// Target ignored because it is past the execution grace.
    pub stale: Option<DateTime<Utc>>,
}

impl ShutdownDecision {
    fn idle() -> Self {
        Self {
            countdown: ShutdownCountdown::Idle,
            announce: false,
            write_back: None,
            stale: None,
        }
    }
}

/// Per-process memory for the shutdown sub-state-machine.
///
/// Remembers which relative marker has already been rebased (so the deadline
/// does not drift forward while the write-back is in flight), which target
/// already had its countdown shown, and which target already executed.
#[derive(Debug, Clone, Default)]
pub struct ShutdownPlanner {
    rebased: Option<(i64, DateTime<Utc>)>,
    announced: Option<DateTime<Utc>>,
    executed: Option<DateTime<Utc>>,
    current: ShutdownCountdown,
}

impl ShutdownPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ShutdownCountdown {
        self.current
    }

    /// Evaluate one poll's shutdown command at `now`.
    pub fn evaluate(&mut self, command: Option<ShutdownTime>, now: DateTime<Utc>) -> ShutdownDecision {
        let mut decision = ShutdownDecision::idle();

        let target = match command {
            None => {
                self.rebased = None;
                None
            }
            Some(ShutdownTime::Absolute(at)) => {
                // The write-back landed (or an operator set a fixed time).
                self.rebased = None;
                Some(at)
            }
            Some(marker @ ShutdownTime::Relative { minutes }) => match self.rebased {
                Some((seen, at)) if seen == minutes => Some(at),
                _ => match marker.resolve(now) {
                    Some(at) => {
                        self.rebased = Some((minutes, at));
                        decision.write_back = Some(at);
                        Some(at)
                    }
                    None => {
                        self.rebased = None;
                        None
                    }
                },
            },
        };

        if let Some(target) = target {
            match ShutdownWindow::classify(target, now) {
                ShutdownWindow::NotDue => {}
                ShutdownWindow::Countdown => {
                    decision.countdown = ShutdownCountdown::Pending(target);
                    if self.announced != Some(target) {
                        self.announced = Some(target);
                        decision.announce = true;
                    }
                }
                ShutdownWindow::Execute => {
                    if self.executed != Some(target) {
                        self.executed = Some(target);
                        decision.countdown = ShutdownCountdown::Executing(target);
                    }
                }
                ShutdownWindow::Stale => decision.stale = Some(target),
            }
        }

        self.current = decision.countdown;
        decision
    }
}
