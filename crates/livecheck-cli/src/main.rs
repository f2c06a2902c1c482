mod cache;
mod run;
mod shard;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cache::CacheCommands;
use crate::shard::ShardCommands;

#[derive(Debug, Parser)]
#[command(name = "livecheck")]
#[command(about = "Validate live stream URLs and detect fake streams")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run all three stages over every shard, then merge the cache
    Run {
        /// JSON array of candidate streams
        #[arg(long)]
        input: PathBuf,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        slot: SlotArgs,
    },
    /// Split candidates into shards or run a single shard
    Shard {
        #[command(subcommand)]
        command: ShardCommands,
    },
    /// Maintain the perceptual-hash cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Sampling slot for stage 3. Defaults to today and the nearest timepoint.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct SlotArgs {
    /// Sample date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Timepoint label, e.g. 0811
    #[arg(long)]
    pub timepoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = livecheck_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Run {
            input,
            report,
            slot,
        }) => run::run_full(&config, &input, report.as_deref(), &slot).await?,
        Some(Commands::Shard { command }) => shard::run_shard_command(&config, command).await?,
        Some(Commands::Cache { command }) => cache::run_cache_command(&config, &command)?,
        None => println!("livecheck: no command given, see --help"),
    }

    Ok(())
}
