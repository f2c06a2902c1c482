//! `cache` command handlers. These never touch the network.

use clap::Subcommand;
use livecheck_core::AppConfig;

use crate::run::{cache_store, write_json};

/// Sub-commands available under `cache`.
#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Merge pending shard deltas into the canonical store
    Merge,
    /// Delete merged delta directories older than the last merged date
    Clean,
    /// Print canonical store statistics
    Stats,
}

pub(crate) fn run_cache_command(config: &AppConfig, command: &CacheCommands) -> anyhow::Result<()> {
    let store = cache_store(config);
    match command {
        CacheCommands::Merge => write_json(None, &store.merge_pending()?),
        CacheCommands::Clean => {
            let removed = store.clean()?;
            if removed.is_empty() {
                println!("no merged delta directories to remove");
            }
            for date in removed {
                println!("removed {}", store.delta_dir(date).display());
            }
            Ok(())
        }
        CacheCommands::Stats => write_json(None, &store.stats()?),
    }
}
