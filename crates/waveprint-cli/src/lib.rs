//! Shared plumbing for the waveprint command line tools.

pub mod engine;
pub mod output;

use anyhow::Result;
use std::path::Path;
use waveprint_core::config::WaveprintConfig;

/// Load the configuration for a binary: an explicit `--config` file, or the
/// defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<WaveprintConfig> {
    match path {
        Some(path) => WaveprintConfig::from_file(path),
        None => Ok(WaveprintConfig::default()),
    }
}
