//! stride-core - Core library for Stride
//!
//! This crate contains the local replica, the sync queue and the
//! synchronizer that reconciles offline edits of collections, shoes and runs
//! with the remote store. The CLI and any future front-end build on
//! [`SyncEngine`].

pub mod cache;
pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use models::{Collection, Run, Shoe, SyncConflict, SyncState, SyncStatusKind};
pub use remote::{HttpRemoteApi, MemoryRemote, RemoteApi, RemoteConfig, RemoteError};
pub use store::LocalStore;
pub use sync::{ConflictStrategy, CycleOutcome, SyncConfig, SyncReport};
