//! Shard Coordinator: partitioning, the per-shard stage pipeline, and the
//! serial merge of shard cache deltas.

pub mod coordinator;
pub mod error;
pub mod partition;
pub mod pipeline;

pub use coordinator::{Coordinator, RunSummary, ShardSummary};
pub use error::ShardError;
pub use partition::{dedupe, partition, Shard};
pub use pipeline::{BucketCounts, ShardPipeline, ShardReport};
