//! The `run` command and the wiring shared with `shard run`.
//!
//! Production capabilities are built here: the reqwest reachability client,
//! `ffprobe` for inspection and `ffmpeg` for frame grabs.

use std::path::Path;

use anyhow::Context;
use livecheck_cache::CacheStore;
use livecheck_core::{AppConfig, CandidateStream};
use livecheck_fingerprint::{FfmpegFrameGrabber, SampleSlot};
use livecheck_probe::{FfprobeInspector, HttpReachabilityClient};
use livecheck_shard::{Coordinator, ShardPipeline};
use serde::Serialize;

use crate::SlotArgs;

pub(crate) type LiveCoordinator =
    Coordinator<HttpReachabilityClient, FfprobeInspector, FfmpegFrameGrabber>;

pub(crate) fn build_coordinator(config: &AppConfig) -> anyhow::Result<LiveCoordinator> {
    let client = HttpReachabilityClient::new(&config.admission.user_agent)
        .context("failed to build HTTP client")?;
    let inspector = FfprobeInspector::new(config.deep_probe.ffprobe_bin.clone());
    let grabber = FfmpegFrameGrabber::new(config.fingerprint.ffmpeg_bin.clone());
    let pipeline = ShardPipeline::new(client, inspector, grabber, config);
    Ok(Coordinator::new(
        pipeline,
        cache_store(config),
        config.shard.clone(),
    ))
}

pub(crate) fn cache_store(config: &AppConfig) -> CacheStore {
    CacheStore::new(config.cache_dir.clone(), config.timepoints.clone())
}

/// Reads a JSON array of candidate streams.
pub(crate) fn read_candidates(path: &Path) -> anyhow::Result<Vec<CandidateStream>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of candidates", path.display()))
}

/// Resolves the sampling slot, defaulting to the local date and the
/// timepoint nearest the local clock.
pub(crate) fn resolve_slot(config: &AppConfig, args: &SlotArgs) -> anyhow::Result<SampleSlot> {
    let now = chrono::Local::now();
    let date = args.date.unwrap_or_else(|| now.date_naive());
    let timepoint = match &args.timepoint {
        Some(label) if config.timepoints.contains(label) => label.clone(),
        Some(label) => anyhow::bail!(
            "unknown timepoint \"{label}\"; expected one of {}",
            config.timepoints.labels().join(", ")
        ),
        None => config.timepoints.label_for(now.time()).to_owned(),
    };
    Ok(SampleSlot { date, timepoint })
}

/// Pretty-prints `value` to `path`, or to stdout when no path is given.
pub(crate) fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    let Some(path) = path else {
        println!("{text}");
        return Ok(());
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(path, format!("{text}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

/// Full run: every shard, then the merge.
///
/// # Errors
///
/// Returns an error if the input cannot be read, the slot is invalid, a
/// required tool is missing, or the cache cannot be read or written.
pub(crate) async fn run_full(
    config: &AppConfig,
    input: &Path,
    report: Option<&Path>,
    slot: &SlotArgs,
) -> anyhow::Result<()> {
    let candidates = read_candidates(input)?;
    let slot = resolve_slot(config, slot)?;
    let coordinator = build_coordinator(config)?;

    let summary = coordinator.run(candidates, &slot).await?;
    write_json(report, &summary)?;
    if report.is_some() {
        println!(
            "{} candidates in {} shards: {}",
            summary.totals.total(),
            summary.shards.len(),
            summary.totals
        );
    }
    Ok(())
}
