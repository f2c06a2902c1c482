//! Per-shard stage 1 → 2 → 3 pipeline.
//!
//! Each stage only sees the previous stage's survivors. Every candidate
//! leaves the pipeline in exactly one [`OutcomeBucket`].

use std::collections::{BTreeMap, HashMap};

use livecheck_cache::HashCache;
use livecheck_core::{
    AppConfig, CandidateStream, DeepProbeResult, FailureKind, FrameHashSample, OutcomeBucket,
    ProbeResult, StageFailure, StreamOutcome,
};
use livecheck_fingerprint::{Detection, FakeDetector, FrameGrabber, SampleSlot};
use livecheck_probe::{AdmissionProber, DeepProber, MediaInspector, ReachabilityClient};
use serde::Serialize;

use crate::error::ShardError;
use crate::partition::Shard;

/// Per-bucket URL counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BucketCounts(BTreeMap<OutcomeBucket, usize>);

impl BucketCounts {
    pub fn from_outcomes(outcomes: &[StreamOutcome]) -> Self {
        let mut counts = Self::default();
        for o in outcomes {
            *counts.0.entry(o.bucket).or_default() += 1;
        }
        counts
    }

    pub fn get(&self, bucket: OutcomeBucket) -> usize {
        self.0.get(&bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn add(&mut self, other: &BucketCounts) {
        for (bucket, n) in &other.0 {
            *self.0.entry(*bucket).or_default() += n;
        }
    }
}

impl std::fmt::Display for BucketCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = OutcomeBucket::ALL
            .iter()
            .map(|b| format!("{}={}", b.as_str(), self.get(*b)))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Result of running one shard.
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub shard_id: String,
    /// One outcome per candidate, in the shard's input order.
    pub outcomes: Vec<StreamOutcome>,
    pub counts: BucketCounts,
    /// Cache entries produced by this shard.
    pub delta: HashCache,
}

pub struct ShardPipeline<C, I, G> {
    prober: AdmissionProber<C>,
    deep: DeepProber<I>,
    detector: FakeDetector<G>,
}

impl<C, I, G> ShardPipeline<C, I, G>
where
    C: ReachabilityClient,
    I: MediaInspector,
    G: FrameGrabber,
{
    pub fn new(client: C, inspector: I, grabber: G, config: &AppConfig) -> Self {
        Self {
            prober: AdmissionProber::new(client, config.admission.clone()),
            deep: DeepProber::new(inspector, &config.deep_probe),
            detector: FakeDetector::new(grabber, config.fingerprint.clone()),
        }
    }

    /// Runs all three stages over `shard`. `history` is the canonical cache
    /// consulted by stage 3; new samples go into the returned delta.
    ///
    /// # Errors
    ///
    /// - [`ShardError::InvalidSlot`] if the slot's timepoint is not in the
    ///   cache's label set. Checked before any stage runs.
    /// - [`ShardError::Configuration`] when the inspection or frame-grab
    ///   capability is missing.
    /// - [`ShardError::Cache`] if a classified sample cannot be cached.
    pub async fn run_shard(
        &self,
        shard: &Shard,
        slot: &SampleSlot,
        history: &HashCache,
    ) -> Result<ShardReport, ShardError> {
        ShardError::check_slot(history.timepoints(), &slot.timepoint)?;
        tracing::info!(shard = %shard.id, candidates = shard.candidates.len(), "shard starting");

        let urls = shard.urls();
        let probes: HashMap<String, ProbeResult> = self
            .prober
            .run(&urls)
            .await
            .into_iter()
            .map(|r| (r.url.clone(), r))
            .collect();

        let reachable: Vec<String> = urls
            .iter()
            .filter(|u| probes.get(*u).is_some_and(|r| r.reachable))
            .cloned()
            .collect();
        let deep: HashMap<String, DeepProbeResult> = self
            .deep
            .run(&reachable)
            .await
            .map_err(|e| ShardError::Configuration(e.to_string()))?
            .into_iter()
            .map(|r| (r.url.clone(), r))
            .collect();

        let media_ok: Vec<String> = reachable
            .iter()
            .filter(|u| deep.get(*u).is_some_and(DeepProbeResult::is_valid))
            .cloned()
            .collect();
        let past: HashMap<String, Vec<FrameHashSample>> = media_ok
            .iter()
            .map(|u| (u.clone(), history.history(u)))
            .collect();
        let detections: HashMap<String, Detection> = self
            .detector
            .run(&media_ok, slot, &past)
            .await
            .map_err(|e| ShardError::Configuration(e.to_string()))?
            .into_iter()
            .collect();

        let mut delta = HashCache::new(history.timepoints().clone());
        let mut outcomes = Vec::with_capacity(shard.candidates.len());
        for candidate in &shard.candidates {
            let outcome = assemble(
                candidate,
                probes.get(&candidate.url),
                deep.get(&candidate.url),
                detections.get(&candidate.url),
            );
            if let Some(Detection::Classified { sample, .. }) = detections.get(&candidate.url) {
                delta.upsert_sample(sample)?;
            }
            outcomes.push(outcome);
        }

        let counts = BucketCounts::from_outcomes(&outcomes);
        tracing::info!(shard = %shard.id, %counts, cached = delta.len(), "shard complete");
        Ok(ShardReport {
            shard_id: shard.id.clone(),
            outcomes,
            counts,
            delta,
        })
    }
}

/// Places a candidate in the bucket of the first stage it did not pass.
fn assemble(
    candidate: &CandidateStream,
    probe: Option<&ProbeResult>,
    deep: Option<&DeepProbeResult>,
    detection: Option<&Detection>,
) -> StreamOutcome {
    let mut outcome = StreamOutcome {
        candidate: candidate.clone(),
        bucket: OutcomeBucket::Stage1Invalid,
        probe: probe.cloned(),
        deep_probe: deep.cloned(),
        verdict: None,
        failure: None,
    };

    if !probe.is_some_and(|p| p.reachable) {
        outcome.failure = Some(
            probe
                .and_then(|p| p.error.clone())
                .unwrap_or_else(|| missing("stage 1")),
        );
        return outcome;
    }

    if !deep.is_some_and(DeepProbeResult::is_valid) {
        outcome.bucket = OutcomeBucket::Stage2Invalid;
        outcome.failure = Some(
            deep.and_then(|d| d.error.clone())
                .unwrap_or_else(|| missing("stage 2")),
        );
        return outcome;
    }

    match detection {
        Some(Detection::Classified { verdict, .. }) => {
            outcome.bucket = if verdict.is_fake {
                OutcomeBucket::Fake
            } else {
                OutcomeBucket::Valid
            };
            outcome.verdict = Some(verdict.clone());
        }
        Some(Detection::Undetermined { failure }) => {
            outcome.bucket = OutcomeBucket::Stage3Undetermined;
            outcome.failure = Some(failure.clone());
        }
        None => {
            outcome.bucket = OutcomeBucket::Stage3Undetermined;
            outcome.failure = Some(missing("stage 3"));
        }
    }
    outcome
}

fn missing(stage: &str) -> StageFailure {
    StageFailure::new(
        FailureKind::ToolInvocation,
        format!("no {stage} result recorded"),
    )
}

#[cfg(test)]
mod tests {
    use livecheck_core::{FakeVerdict, ProbeMethod, VerdictBasis};

    use super::*;

    fn candidate() -> CandidateStream {
        CandidateStream {
            display_name: "Test".to_owned(),
            url: "http://s.test/live".to_owned(),
            source_tag: "tag".to_owned(),
            logo_ref: String::new(),
        }
    }

    fn probe(reachable: bool) -> ProbeResult {
        ProbeResult {
            url: candidate().url,
            reachable,
            latency_ms: reachable.then_some(12),
            method_used: reachable.then_some(ProbeMethod::Head),
            status: Some(if reachable { 200 } else { 404 }),
            attempts: 1,
            error: (!reachable).then(|| StageFailure::new(FailureKind::Network, "404")),
        }
    }

    fn deep_ok() -> DeepProbeResult {
        DeepProbeResult {
            url: candidate().url,
            has_video: true,
            ..DeepProbeResult::default()
        }
    }

    #[test]
    fn unreachable_lands_in_stage1_bucket() {
        let o = assemble(&candidate(), Some(&probe(false)), None, None);
        assert_eq!(o.bucket, OutcomeBucket::Stage1Invalid);
        assert_eq!(o.failure.unwrap().kind, FailureKind::Network);
    }

    #[test]
    fn missing_probe_is_still_bucketed() {
        let o = assemble(&candidate(), None, None, None);
        assert_eq!(o.bucket, OutcomeBucket::Stage1Invalid);
        assert!(o.failure.is_some());
    }

    #[test]
    fn invalid_media_lands_in_stage2_bucket() {
        let bad = DeepProbeResult {
            url: candidate().url,
            error: Some(StageFailure::new(FailureKind::Parse, "no video stream")),
            ..DeepProbeResult::default()
        };
        let o = assemble(&candidate(), Some(&probe(true)), Some(&bad), None);
        assert_eq!(o.bucket, OutcomeBucket::Stage2Invalid);
        assert_eq!(o.failure.unwrap().kind, FailureKind::Parse);
    }

    #[test]
    fn verdict_decides_final_bucket() {
        let verdict = FakeVerdict {
            url: candidate().url,
            is_fake: true,
            max_similarity: 1.0,
            basis: VerdictBasis::StaticFrames,
        };
        let detection = Detection::Classified {
            verdict,
            sample: FrameHashSample {
                url: candidate().url,
                timepoint: "0811".to_owned(),
                sample_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                hashes: None,
                error: None,
            },
        };
        let o = assemble(
            &candidate(),
            Some(&probe(true)),
            Some(&deep_ok()),
            Some(&detection),
        );
        assert_eq!(o.bucket, OutcomeBucket::Fake);
        assert!(o.verdict.unwrap().is_fake);
    }

    #[test]
    fn undetermined_is_not_fake() {
        let detection = Detection::Undetermined {
            failure: StageFailure::new(FailureKind::FrameUnavailable, "no usable frame"),
        };
        let o = assemble(
            &candidate(),
            Some(&probe(true)),
            Some(&deep_ok()),
            Some(&detection),
        );
        assert_eq!(o.bucket, OutcomeBucket::Stage3Undetermined);
        assert!(o.verdict.is_none());
    }

    #[test]
    fn counts_display_every_bucket() {
        let o = assemble(&candidate(), Some(&probe(false)), None, None);
        let counts = BucketCounts::from_outcomes(&[o]);
        assert_eq!(counts.total(), 1);
        assert_eq!(
            counts.to_string(),
            "stage1_invalid=1 stage2_invalid=0 stage3_undetermined=0 valid=0 fake=0"
        );
    }
}
