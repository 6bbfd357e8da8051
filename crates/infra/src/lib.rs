//! Infrastructure layer: threads, timers, local config storage.

pub mod clock;
pub mod config_store;
pub mod interactive_loop;
pub mod monitor;
pub mod worker_pool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{
    ConfigStore, ConfigStoreExt, InMemoryConfigStore, SqliteConfigStore, StoreError,
};
pub use interactive_loop::{InteractiveLoop, LoopClosed, LoopHandle, LoopTask, TimerId};
pub use monitor::{HungHandler, MonitorConfig, ResponsivenessMonitor};
pub use worker_pool::{
    Completion, PoolStats, TaskError, TaskId, WorkerPool, WorkerPoolConfig, MIN_WORKERS,
};
