//! Blob cache eviction policy

mod evictor;

pub use evictor::{CacheEntryMeta, CacheEvictor, EvictionPlan, DEFAULT_CACHE_QUOTA_BYTES};
