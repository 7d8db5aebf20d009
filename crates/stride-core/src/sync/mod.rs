//! Synchronization between the local replica and the remote store.

mod config;
mod listeners;
mod orchestrator;
mod resolver;
mod scheduler;

pub use config::{
    ConflictStrategy, SyncConfig, DEFAULT_BATCH_SIZE, DEFAULT_SYNC_INTERVAL, MAX_ERRORS,
    MIN_SYNC_INTERVAL,
};
pub use listeners::{ListenerHandle, ListenerRegistry, SyncListener};
pub use orchestrator::{CycleOutcome, SyncOrchestrator, SyncReport};
pub use resolver::{ConflictResolver, ResolveSummary};
pub use scheduler::{run_scheduler, spawn_scheduler, NetworkMonitor, TickSource};
