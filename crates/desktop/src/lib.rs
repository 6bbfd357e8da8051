//! `rxdesk-desktop`
//!
//! **Responsibility:** the access-control agent embedded in the desktop
//! application.
//!
//! This crate provides:
//! - The licensing backend client and the startup connectivity probe
//! - The contract expiry check and the periodic license guard
//! - Startup routing (locked / register / enter, online or offline)
//!
//! Screens consume its [`Route`] and the events on the agent bus; they never
//! talk to the backend directly.

pub mod context;
pub mod contract;
pub mod gate;
pub mod guard;
pub mod host;
pub mod offline;
pub mod probe;
pub mod registration;
pub mod remote;
pub mod settings;
pub mod watchdog;

pub use context::AgentContext;
pub use contract::{ContractValidator, ContractVerdict};
pub use gate::{ConfigStoreIntegrity, ConnectivityGate, DataIntegrity, Route};
pub use guard::{BootCheck, LicenseGuard};
pub use host::{HostControl, SystemHostControl};
pub use offline::{ConnectivityState, OfflineMode};
pub use probe::{ConnectivityProbe, NetTransport, ProbeError, Transport};
pub use registration::register_installation;
pub use remote::{ActivationEvent, HttpAuthorityClient, RemoteAuthorityClient, RemoteError};
pub use settings::AgentSettings;
pub use watchdog::start_watchdog;
