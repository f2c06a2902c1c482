use livecheck_cache::CacheError;
use livecheck_core::TimepointSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShardError {
    /// A required external capability is missing. Aborts the whole run.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shard size must be at least 1")]
    InvalidShardSize,

    #[error("timepoint \"{timepoint}\" is not one of {expected}")]
    InvalidSlot { timepoint: String, expected: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ShardError {
    /// Rejects a slot whose timepoint the cache cannot store.
    pub(crate) fn check_slot(timepoints: &TimepointSet, timepoint: &str) -> Result<(), Self> {
        if timepoints.contains(timepoint) {
            Ok(())
        } else {
            Err(ShardError::InvalidSlot {
                timepoint: timepoint.to_owned(),
                expected: timepoints.labels().join(", "),
            })
        }
    }
}
