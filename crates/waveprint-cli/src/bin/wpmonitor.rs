//! Monitor a long audio stream: query it stepwise in overlapping segments.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use waveprint_cli::engine::Engine;
use waveprint_cli::load_config;
use waveprint_cli::output::print_json;
use waveprint_index::SqliteStore;

#[derive(Parser)]
#[command(name = "wpmonitor", about = "Identify segments of a long audio stream")]
struct Args {
    /// WAV file to monitor
    file: PathBuf,

    /// Path of the index database
    #[arg(long, default_value = "waveprint.db")]
    db: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of results per segment
    #[arg(long, default_value_t = 3)]
    max_results: usize,

    /// Suppress matches against the monitored file itself
    #[arg(long)]
    avoid_self: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let store = SqliteStore::open(&args.db)?;
    let mut engine = Engine::new(config, store);

    engine.monitor(&args.file, args.max_results, args.avoid_self, &mut |_, results| {
        for result in results {
            let _ = print_json(result);
        }
    })?;
    Ok(())
}
