//! Print fingerprint database statistics.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use waveprint_cli::engine::Engine;
use waveprint_cli::load_config;
use waveprint_cli::output::print_json;
use waveprint_index::SqliteStore;

#[derive(Parser)]
#[command(name = "wpstats", about = "Print fingerprint database statistics")]
struct Args {
    /// Path of the index database
    #[arg(long, default_value = "waveprint.db")]
    db: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct Stats {
    prints: u64,
    resources: u64,
    total_duration_seconds: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let store = SqliteStore::open(&args.db)?;
    let mut engine = Engine::new(config, store);
    let stats = engine.stats()?;

    print_json(&Stats {
        prints: stats.print_count,
        resources: stats.resource_count,
        total_duration_seconds: stats.total_duration_seconds,
    })
}
