//! Stage 3: fake/static stream detection.
//!
//! A URL is flagged when its freshly sampled frames are all near-identical
//! to each other, or when any fresh hash triple matches a historical sample
//! of the same URL from another (date, timepoint) slot. A URL that yields no
//! usable frame is undetermined, never fake.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use livecheck_core::{
    FailureKind, FakeVerdict, FingerprintConfig, FrameHashSample, HashTriple, StageFailure,
    VerdictBasis,
};

use crate::error::FingerprintError;
use crate::grabber::FrameGrabber;
use crate::hashing::{analyze_frame, FrameAnalysis};

/// The (date, timepoint) slot a run samples into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSlot {
    pub date: NaiveDate,
    pub timepoint: String,
}

/// Stage 3 outcome for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// At least one usable frame. `sample` is what the cache should record.
    Classified {
        verdict: FakeVerdict,
        sample: FrameHashSample,
    },
    /// No usable frame at any offset.
    Undetermined { failure: StageFailure },
}

/// Thresholds the classifier works with.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub static_similarity: f64,
    pub fake_similarity: f64,
}

impl From<&FingerprintConfig> for Thresholds {
    fn from(config: &FingerprintConfig) -> Self {
        Self {
            static_similarity: config.static_similarity_threshold,
            fake_similarity: config.fake_similarity_threshold,
        }
    }
}

/// Classifies fresh frames against each other and against history.
///
/// The static check needs two or more frames and reports the lowest pairwise
/// similarity. Otherwise every fresh triple is compared with every
/// historical triple outside `slot`, and the best match is reported.
pub fn classify(
    url: &str,
    frames: &[HashTriple],
    history: &[FrameHashSample],
    slot: &SampleSlot,
    thresholds: Thresholds,
) -> FakeVerdict {
    if frames.len() >= 2 {
        let min_pairwise = frames
            .iter()
            .enumerate()
            .flat_map(|(i, a)| frames[i + 1..].iter().map(move |b| a.similarity(b)))
            .fold(f64::INFINITY, f64::min);
        if min_pairwise >= thresholds.static_similarity {
            return FakeVerdict {
                url: url.to_owned(),
                is_fake: true,
                max_similarity: min_pairwise,
                basis: VerdictBasis::StaticFrames,
            };
        }
    }

    let best = history
        .iter()
        .filter(|h| !(h.sample_date == slot.date && h.timepoint == slot.timepoint))
        .filter_map(|h| h.hashes)
        .flat_map(|old| frames.iter().map(move |fresh| fresh.similarity(&old)))
        .fold(0.0f64, f64::max);

    let is_fake = best >= thresholds.fake_similarity;
    FakeVerdict {
        url: url.to_owned(),
        is_fake,
        max_similarity: best,
        basis: if is_fake {
            VerdictBasis::HistoricalMatch
        } else {
            VerdictBasis::NoMatch
        },
    }
}

pub struct FakeDetector<G> {
    grabber: G,
    config: FingerprintConfig,
}

impl<G: FrameGrabber> FakeDetector<G> {
    pub fn new(grabber: G, config: FingerprintConfig) -> Self {
        Self { grabber, config }
    }

    /// Runs detection over `urls`, returning `(url, detection)` pairs in
    /// completion order. `history` maps a URL to its cached samples.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the frame-grab capability is
    /// missing. Per-URL failures are reported as
    /// [`Detection::Undetermined`].
    pub async fn run(
        &self,
        urls: &[String],
        slot: &SampleSlot,
        history: &HashMap<String, Vec<FrameHashSample>>,
    ) -> Result<Vec<(String, Detection)>, FingerprintError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        self.grabber.ensure_available().await?;
        tracing::info!(
            total = urls.len(),
            concurrency = self.config.concurrency,
            date = %slot.date,
            timepoint = %slot.timepoint,
            "stage 3 starting"
        );

        let results: Vec<(String, Detection)> = stream::iter(urls)
            .map(|url| async move {
                let past = history.get(url).map_or(&[][..], Vec::as_slice);
                self.detect(url, slot, past)
                    .await
                    .map(|d| (url.clone(), d))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let fake = results
            .iter()
            .filter(|(_, d)| matches!(d, Detection::Classified { verdict, .. } if verdict.is_fake))
            .count();
        let undetermined = results
            .iter()
            .filter(|(_, d)| matches!(d, Detection::Undetermined { .. }))
            .count();
        tracing::info!(
            total = results.len(),
            fake,
            undetermined,
            "stage 3 complete"
        );
        Ok(results)
    }

    /// Samples every configured offset for one URL and classifies it.
    ///
    /// # Errors
    ///
    /// Only configuration errors escape; everything else is folded into the
    /// returned [`Detection`].
    pub async fn detect(
        &self,
        url: &str,
        slot: &SampleSlot,
        history: &[FrameHashSample],
    ) -> Result<Detection, FingerprintError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut frames = Vec::new();
        let mut discarded = Vec::new();

        for &offset in &self.config.frame_offsets_secs {
            match self.grabber.grab(url, offset, timeout).await {
                Ok(bytes) => match analyze_frame(&bytes, self.config.blank_luma_threshold) {
                    Ok(FrameAnalysis::Hashed(triple)) => frames.push(triple),
                    Ok(FrameAnalysis::Blank(mean)) => {
                        tracing::debug!(url, offset, mean_luma = mean, "blank frame discarded");
                        discarded.push(format!("{offset}s: blank frame (mean luma {mean:.1})"));
                    }
                    Err(e) => {
                        tracing::debug!(url, offset, error = %e, "frame discarded");
                        discarded.push(format!("{offset}s: {e}"));
                    }
                },
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) => {
                    tracing::debug!(url, offset, error = %e, "frame grab failed");
                    discarded.push(format!("{offset}s: {e}"));
                }
            }
        }

        let Some(&first) = frames.first() else {
            let message = if discarded.is_empty() {
                "no usable frame".to_owned()
            } else {
                format!("no usable frame: {}", discarded.join("; "))
            };
            tracing::warn!(url, reason = %message, "stage 3 undetermined");
            return Ok(Detection::Undetermined {
                failure: StageFailure::new(FailureKind::FrameUnavailable, message),
            });
        };

        let verdict = classify(url, &frames, history, slot, Thresholds::from(&self.config));
        if verdict.is_fake {
            tracing::warn!(
                url,
                basis = %verdict.basis,
                similarity = format!("{:.3}", verdict.max_similarity),
                "stream flagged as fake"
            );
        } else {
            tracing::debug!(
                url,
                similarity = format!("{:.3}", verdict.max_similarity),
                frames = frames.len(),
                "stream looks live"
            );
        }

        let sample = FrameHashSample {
            url: url.to_owned(),
            timepoint: slot.timepoint.clone(),
            sample_date: slot.date,
            hashes: Some(first),
            error: (!discarded.is_empty()).then(|| discarded.join("; ")),
        };
        Ok(Detection::Classified { verdict, sample })
    }
}

#[cfg(test)]
#[path = "detector_test.rs"]
mod tests;
