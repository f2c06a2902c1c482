//! Candidate de-duplication and fixed-size partitioning.

use std::collections::HashSet;

use livecheck_core::CandidateStream;
use serde::{Deserialize, Serialize};

use crate::error::ShardError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub id: String,
    pub candidates: Vec<CandidateStream>,
}

impl Shard {
    pub fn urls(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.url.clone()).collect()
    }
}

/// Drops rows whose URL was already seen; the first row wins. Returns the
/// kept rows and how many were dropped.
pub fn dedupe(candidates: Vec<CandidateStream>) -> (Vec<CandidateStream>, usize) {
    let mut seen = HashSet::new();
    let before = candidates.len();
    let kept: Vec<CandidateStream> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Splits `candidates` into shards of at most `shard_size`, in input order,
/// named `shard-1`, `shard-2`, ...
///
/// # Errors
///
/// Returns [`ShardError::InvalidShardSize`] when `shard_size` is zero.
pub fn partition(
    candidates: Vec<CandidateStream>,
    shard_size: usize,
) -> Result<Vec<Shard>, ShardError> {
    if shard_size == 0 {
        return Err(ShardError::InvalidShardSize);
    }
    let mut shards = Vec::with_capacity(candidates.len().div_ceil(shard_size));
    let mut rows = candidates.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk: Vec<CandidateStream> = rows.by_ref().take(shard_size).collect();
        shards.push(Shard {
            id: format!("shard-{}", shards.len() + 1),
            candidates: chunk,
        });
    }
    Ok(shards)
}
