//! `shard` command handlers: splitting a candidate list into shard files and
//! running one shard in isolation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::Subcommand;
use livecheck_core::{AppConfig, CandidateStream, StreamOutcome};
use livecheck_shard::{dedupe, partition, BucketCounts, Shard};
use serde::Serialize;

use crate::run::{build_coordinator, read_candidates, resolve_slot, write_json};
use crate::SlotArgs;

/// Sub-commands available under `shard`.
#[derive(Debug, Subcommand)]
pub enum ShardCommands {
    /// Write one `shard-N.json` candidate file per shard
    Split {
        /// JSON array of candidate streams
        #[arg(long)]
        input: PathBuf,
        /// Directory receiving the shard files
        #[arg(long)]
        out_dir: PathBuf,
        /// Candidates per shard (defaults to LIVECHECK_SHARD_SIZE)
        #[arg(long)]
        shard_size: Option<usize>,
    },
    /// Run one shard and write its cache delta without merging
    Run {
        /// Shard file written by `shard split`
        #[arg(long)]
        input: PathBuf,
        /// Shard id (defaults to the input file stem)
        #[arg(long)]
        shard_id: Option<String>,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        slot: SlotArgs,
    },
}

#[derive(Debug, Serialize)]
struct ShardRunReport<'a> {
    shard_id: &'a str,
    date: NaiveDate,
    timepoint: &'a str,
    counts: &'a BucketCounts,
    delta_path: PathBuf,
    outcomes: &'a [StreamOutcome],
}

pub(crate) async fn run_shard_command(
    config: &AppConfig,
    command: ShardCommands,
) -> anyhow::Result<()> {
    match command {
        ShardCommands::Split {
            input,
            out_dir,
            shard_size,
        } => {
            let candidates = read_candidates(&input)?;
            let size = shard_size.unwrap_or(config.shard.shard_size);
            let written = split_candidates(candidates, size, &out_dir)?;
            for path in &written {
                println!("{}", path.display());
            }
            Ok(())
        }
        ShardCommands::Run {
            input,
            shard_id,
            report,
            slot,
        } => {
            let id = shard_id.map_or_else(|| shard_id_from_path(&input), Ok)?;
            livecheck_cache::validate_shard_id(&id)?;
            let shard = Shard {
                id,
                candidates: read_candidates(&input)?,
            };
            run_one(config, &shard, report.as_deref(), &slot).await
        }
    }
}

/// De-duplicates, partitions and writes each shard's candidates to
/// `<out_dir>/<shard-id>.json`. Returns the written paths in shard order.
pub(crate) fn split_candidates(
    candidates: Vec<CandidateStream>,
    shard_size: usize,
    out_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let (candidates, dropped) = dedupe(candidates);
    if dropped > 0 {
        tracing::warn!(dropped, "duplicate candidate URLs dropped");
    }
    let shards = partition(candidates, shard_size)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(shards.len());
    for shard in &shards {
        let path = out_dir.join(format!("{}.json", shard.id));
        let text = serde_json::to_string_pretty(&shard.candidates)?;
        std::fs::write(&path, format!("{text}\n"))
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(shard = %shard.id, candidates = shard.candidates.len(), path = %path.display(), "shard file written");
        written.push(path);
    }
    Ok(written)
}

pub(crate) fn shard_id_from_path(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("cannot derive a shard id from {}", path.display()))
}

async fn run_one(
    config: &AppConfig,
    shard: &Shard,
    report: Option<&Path>,
    slot: &SlotArgs,
) -> anyhow::Result<()> {
    let slot = resolve_slot(config, slot)?;
    let coordinator = build_coordinator(config)?;
    let result = coordinator.run_single(shard, &slot).await?;

    let out = ShardRunReport {
        shard_id: &result.shard_id,
        date: slot.date,
        timepoint: &slot.timepoint,
        counts: &result.counts,
        delta_path: coordinator.store().delta_path(slot.date, &shard.id),
        outcomes: &result.outcomes,
    };
    write_json(report, &out)?;
    if report.is_some() {
        println!("{}: {}", result.shard_id, result.counts);
    }
    Ok(())
}
