//! Persistent perceptual-hash cache: the canonical store, per-shard deltas,
//! and their serial merge.

pub mod canonical;
pub mod error;
pub mod store;

pub use canonical::{validate_shard_id, CacheStats, CacheStore, MergeRecord, MergeReport};
pub use error::CacheError;
pub use store::{CacheEntry, HashCache};
