//! Data models for Stride

mod collection;
mod entity;
mod run;
mod shoe;
mod sync_conflict;
mod sync_queue;
mod sync_state;

pub use collection::Collection;
pub use entity::{new_local_id, Entity, EntityIndex, SyncStatus, Table};
pub use run::Run;
pub use shoe::Shoe;
pub use sync_conflict::SyncConflict;
pub use sync_queue::{SyncOperation, SyncQueueItem, MAX_RETRY_COUNT};
pub use sync_state::{SyncErrorRecord, SyncState, SyncStatusKind};
