//! Shard Coordinator: partitions candidates, runs shards with bounded
//! parallelism and staggered starts, then merges every shard delta into the
//! canonical cache. Only the coordinator writes the canonical store.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use livecheck_cache::{CacheStore, HashCache, MergeReport};
use livecheck_core::{CandidateStream, ShardConfig, StreamOutcome};
use livecheck_fingerprint::{FrameGrabber, SampleSlot};
use livecheck_probe::{MediaInspector, ReachabilityClient};
use serde::Serialize;

use crate::error::ShardError;
use crate::partition::{dedupe, partition, Shard};
use crate::pipeline::{BucketCounts, ShardPipeline, ShardReport};

#[derive(Debug, Clone, Serialize)]
pub struct ShardSummary {
    pub shard_id: String,
    pub candidates: usize,
    pub counts: BucketCounts,
    pub cached: usize,
}

impl From<&ShardReport> for ShardSummary {
    fn from(report: &ShardReport) -> Self {
        Self {
            shard_id: report.shard_id.clone(),
            candidates: report.outcomes.len(),
            counts: report.counts.clone(),
            cached: report.delta.len(),
        }
    }
}

/// Everything a full run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub date: chrono::NaiveDate,
    pub timepoint: String,
    pub duplicates_dropped: usize,
    pub shards: Vec<ShardSummary>,
    pub totals: BucketCounts,
    pub merge: MergeReport,
    pub outcomes: Vec<StreamOutcome>,
}

pub struct Coordinator<C, I, G> {
    pipeline: ShardPipeline<C, I, G>,
    store: CacheStore,
    config: ShardConfig,
}

impl<C, I, G> Coordinator<C, I, G>
where
    C: ReachabilityClient,
    I: MediaInspector,
    G: FrameGrabber,
{
    pub fn new(pipeline: ShardPipeline<C, I, G>, store: CacheStore, config: ShardConfig) -> Self {
        Self {
            pipeline,
            store,
            config,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Full run: de-duplicate, partition, run every shard, write each delta,
    /// then merge all deltas serially.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError`] when the slot is invalid, a capability is
    /// missing, or the cache cannot be read or written. No merge happens
    /// after an error.
    pub async fn run(
        &self,
        candidates: Vec<CandidateStream>,
        slot: &SampleSlot,
    ) -> Result<RunSummary, ShardError> {
        ShardError::check_slot(self.store.timepoints(), &slot.timepoint)?;
        let (candidates, duplicates_dropped) = dedupe(candidates);
        if duplicates_dropped > 0 {
            tracing::warn!(duplicates_dropped, "duplicate candidate URLs dropped");
        }
        let shards = partition(candidates, self.config.shard_size)?;
        let history = self.store.load_canonical()?;
        let stagger = Duration::from_secs(self.config.stagger_secs);
        let parallelism = self.config.parallelism.max(1);

        tracing::info!(
            shards = shards.len(),
            parallelism,
            stagger_secs = self.config.stagger_secs,
            date = %slot.date,
            timepoint = %slot.timepoint,
            "run starting"
        );

        let mut reports: Vec<ShardReport> = stream::iter(shards.iter().enumerate())
            .map(|(i, shard)| {
                let history = &history;
                async move {
                    let delay = stagger * u32::try_from(i).unwrap_or(u32::MAX);
                    if !delay.is_zero() {
                        tracing::debug!(shard = %shard.id, delay_secs = delay.as_secs(), "staggered start");
                        tokio::time::sleep(delay).await;
                    }
                    self.run_and_persist(shard, slot, history).await
                }
            })
            .buffer_unordered(parallelism)
            .try_collect()
            .await?;
        reports.sort_by_key(|r| shard_index(&r.shard_id));

        let merge = self.store.merge_pending()?;

        let mut totals = BucketCounts::default();
        for report in &reports {
            totals.add(&report.counts);
        }
        tracing::info!(%totals, shards = reports.len(), "run complete");

        Ok(RunSummary {
            date: slot.date,
            timepoint: slot.timepoint.clone(),
            duplicates_dropped,
            shards: reports.iter().map(ShardSummary::from).collect(),
            totals,
            merge,
            outcomes: reports.into_iter().flat_map(|r| r.outcomes).collect(),
        })
    }

    /// Runs a single shard against the canonical cache and writes its delta.
    /// Repeated URLs in the shard are dropped first, the first row winning.
    /// Does not merge.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError`] when the slot is invalid, a capability is
    /// missing, or the cache cannot be read or written.
    pub async fn run_single(
        &self,
        shard: &Shard,
        slot: &SampleSlot,
    ) -> Result<ShardReport, ShardError> {
        ShardError::check_slot(self.store.timepoints(), &slot.timepoint)?;
        let (candidates, dropped) = dedupe(shard.candidates.clone());
        if dropped > 0 {
            tracing::warn!(
                shard = %shard.id,
                duplicates_dropped = dropped,
                "duplicate candidate URLs dropped"
            );
        }
        let shard = Shard {
            id: shard.id.clone(),
            candidates,
        };
        let history = self.store.load_canonical()?;
        self.run_and_persist(&shard, slot, &history).await
    }

    async fn run_and_persist(
        &self,
        shard: &Shard,
        slot: &SampleSlot,
        history: &HashCache,
    ) -> Result<ShardReport, ShardError> {
        let report = self.pipeline.run_shard(shard, slot, history).await?;
        self.store.write_delta(slot.date, &shard.id, &report.delta)?;
        Ok(report)
    }
}

/// Numeric suffix of `shard-N`; unknown shapes sort last.
fn shard_index(id: &str) -> usize {
    id.strip_prefix("shard-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}
