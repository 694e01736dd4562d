//! Index audio files into a fingerprint database.

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use waveprint_cli::engine::Engine;
use waveprint_cli::load_config;
use waveprint_index::{FileCache, SqliteStore};

#[derive(Parser)]
#[command(name = "wpstore", about = "Index audio files into a fingerprint database")]
struct Args {
    /// WAV files to index
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path of the index database
    #[arg(long, default_value = "waveprint.db")]
    db: PathBuf,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache extracted prints in this directory and replay them when present
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Re-index files that are already in the database
    #[arg(long)]
    force: bool,
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

    let failures = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    // One engine (and one database connection) per worker file.
    args.files.par_iter().for_each(|file| {
        let run = || -> Result<bool> {
            let store = SqliteStore::open(&args.db)?;
            let mut engine = Engine::new(config.clone(), store);
            if !args.force && engine.has_resource(file)? {
                info!("{}: already indexed, skipping", file.display());
                return Ok(false);
            }
            engine.store_resource(file, cache.as_ref())?;
            Ok(true)
        };
        match run() {
            Ok(true) => {}
            Ok(false) => {
                skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                error!("{}: {e:#}", file.display());
            }
        }
    });

    let failures = failures.into_inner();
    let skipped = skipped.into_inner();
    info!(
        "indexed {} files, skipped {}, {} failed",
        args.files.len() - failures - skipped,
        skipped,
        failures
    );
    if failures > 0 {
        anyhow::bail!("{failures} of {} files failed", args.files.len());
    }
    Ok(())
}
