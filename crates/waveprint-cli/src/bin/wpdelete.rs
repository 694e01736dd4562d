//! Remove indexed audio files from a fingerprint database.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use waveprint_cli::engine::Engine;
use waveprint_cli::load_config;
use waveprint_index::{FileCache, SqliteStore};

#[derive(Parser)]
#[command(name = "wpdelete", about = "Remove indexed audio files from a fingerprint database")]
struct Args {
    /// WAV files to remove
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path of the index database
    #[arg(long, default_value = "waveprint.db")]
    db: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read prints from this cache directory instead of re-extracting
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let cache = args
        .cache_dir
        .as_deref()
        .map(FileCache::new)
        .transpose()?;

    let store = SqliteStore::open(&args.db)?;
    let mut engine = Engine::new(config, store);

    for file in &args.files {
        let deleted = engine.delete_resource(file, cache.as_ref())?;
        info!("{}: removed {deleted} prints", file.display());
    }
    Ok(())
}
