use chrono::{DateTime, Utc};
use rxdesk_core::LockReason;
use serde::Serialize;

/// Signals the agent raises for the rest of the application.
///
/// Lock events are edge-triggered; `ModulesChanged` is level-triggered and
/// repeats after every successful poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Locked {
        reason: String,
        contact_info: Option<String>,
    },
    Unlocked,
    ModulesChanged {
        store_active: bool,
        pharmacy_active: bool,
    },
    ShutdownCountdownStarted {
        target: DateTime<Utc>,
    },
    /// The interactive thread stopped feeding the monitor for `seconds`.
    Hung {
        seconds: f64,
    },
}

impl AgentEvent {
    pub fn locked(reason: &LockReason) -> Self {
        AgentEvent::Locked {
            reason: reason.reason.clone(),
            contact_info: reason.contact_info.clone(),
        }
    }

    /// Stable event name, used for logging and the UI event channel.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Locked { .. } => "license:locked",
            AgentEvent::Unlocked => "license:unlocked",
            AgentEvent::ModulesChanged { .. } => "license:modules_changed",
            AgentEvent::ShutdownCountdownStarted { .. } => "shutdown:countdown_started",
            AgentEvent::Hung { .. } => "ui:hung",
        }
    }
}
