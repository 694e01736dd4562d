//! Query audio files against a fingerprint database.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use waveprint_cli::engine::Engine;
use waveprint_cli::load_config;
use waveprint_cli::output::print_results;
use waveprint_index::SqliteStore;

#[derive(Parser)]
#[command(name = "wpquery", about = "Query audio files against a fingerprint database")]
struct Args {
    /// WAV files to identify
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path of the index database
    #[arg(long, default_value = "waveprint.db")]
    db: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of results per query
    #[arg(long, default_value_t = 10)]
    max_results: usize,

    /// Suppress matches against the query file itself
    #[arg(long)]
    avoid_self: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let store = SqliteStore::open(&args.db)?;
    let mut engine = Engine::new(config, store);

    for file in &args.files {
        let results = engine.query_file(file, args.max_results, args.avoid_self)?;
        print_results(&file.to_string_lossy(), &results)?;
    }
    Ok(())
}
