//! `rxdesk-core`: access-control domain building blocks.
//!
//! This crate contains **pure domain** logic (no IO, no threads, no clocks):
//! the installation record, the lock and shutdown state machines, and the
//! config cache vocabulary. Callers pass `now` in explicitly.

pub mod config_key;
pub mod error;
pub mod id;
pub mod installation;
pub mod lock;
pub mod shutdown;

pub use config_key::ConfigKey;
pub use error::{AccessError, AccessResult};
pub use id::SystemId;
pub use installation::{InstallState, InstallationStatus, ShutdownTime};
pub use lock::{LockReason, LockState, LockTransition};
pub use shutdown::{ShutdownCountdown, ShutdownDecision, ShutdownPlanner, ShutdownWindow};
