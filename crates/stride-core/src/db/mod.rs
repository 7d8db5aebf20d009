//! Database layer for Stride

mod blob_repository;
mod connection;
mod entity_repository;
mod metadata_repository;
mod migrations;
mod queue_repository;

pub use blob_repository::{BlobRepository, CacheEntry, LibSqlBlobRepository};
pub use connection::Database;
pub use entity_repository::{EntityRepository, EntityRow, LibSqlEntityRepository};
pub use metadata_repository::{LibSqlMetadataRepository, MetadataRepository};
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
