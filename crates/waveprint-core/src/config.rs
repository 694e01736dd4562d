//! Configuration parameters for the fingerprinting pipeline.
//!
//! The defaults below are calibrated values; the matching tolerances in
//! particular are tuned against each other, so change them as a set.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// All tunable constants of the pipeline, from frame layout to match scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveprintConfig {
    // Frame source
    pub sample_rate: u32,
    /// Samples per analysis frame. The magnitude spectrum has `frame_size / 2` bins.
    pub frame_size: usize,
    /// Overlap between consecutive frames, in samples. The hop size is
    /// `frame_size - frame_overlap`.
    pub frame_overlap: usize,

    // Event point extraction
    pub freq_max_filter_size: usize,
    pub freq_min_filter_size: usize,
    pub time_max_filter_size: usize,
    pub time_min_filter_size: usize,
    /// Lower bound on `log1p(min) / log1p(max)`: rejects near-silence.
    pub min_ratio_threshold: f32,
    /// Upper bound on the same ratio: rejects flat regions without contrast.
    pub max_ratio_threshold: f32,
    /// A point must carry at least this fraction of the frame maximum (log scale).
    pub min_energy_for_point: f32,
    /// Shift the reported bin by one when quadratic interpolation of the
    /// neighbouring magnitudes puts the true peak closer to a neighbour.
    pub refine_frequency: bool,

    // Fingerprint construction
    pub fp_min_freq_dist: u16,
    pub fp_max_freq_dist: u16,
    pub fp_min_time_dist: u32,
    pub fp_max_time_dist: u32,
    /// Fan-out bound: keep at most this many fingerprints per anchor point,
    /// selected by highest combined magnitude.
    pub max_prints_per_anchor: usize,

    // Matching
    /// Fuzz range (± on the hash) applied to index range scans, and also the
    /// delta-t tolerance (in frames) when re-filtering hits against the
    /// fitted alignment.
    pub query_range: u64,
    pub min_unfiltered_hits: usize,
    pub min_filtered_hits: usize,
    pub hit_part_max_size: usize,
    pub hit_part_divider: usize,
    pub min_time_factor: f64,
    pub max_time_factor: f64,
    pub min_freq_factor: f64,
    pub max_freq_factor: f64,
    /// Minimum fraction of one-second bins in the matched span with a hit.
    pub min_seconds_with_match: f64,
    /// Minimum matched duration in seconds.
    pub min_match_duration: f64,

    // Monitor mode
    pub monitor_step_seconds: f64,
    pub monitor_overlap_seconds: f64,
}

impl Default for WaveprintConfig {
    fn default() -> Self {
        Self {
            // 1024-sample frames with a 128-sample hop: one frame every 8 ms.
            sample_rate: 16000,
            frame_size: 1024,
            frame_overlap: 896,

            freq_max_filter_size: 103,
            freq_min_filter_size: 7,
            time_max_filter_size: 25,
            time_min_filter_size: 5,
            min_ratio_threshold: 0.20,
            max_ratio_threshold: 0.90,
            min_energy_for_point: 0.1,
            refine_frequency: false,

            fp_min_freq_dist: 1,
            fp_max_freq_dist: 128,
            fp_min_time_dist: 2,
            fp_max_time_dist: 33,
            max_prints_per_anchor: 10,

            query_range: 2,
            min_unfiltered_hits: 10,
            min_filtered_hits: 5,
            hit_part_max_size: 250,
            hit_part_divider: 5,
            min_time_factor: 0.8,
            max_time_factor: 1.2,
            min_freq_factor: 0.8,
            max_freq_factor: 1.2,
            min_seconds_with_match: 0.2,
            min_match_duration: 5.0,

            monitor_step_seconds: 25.0,
            monitor_overlap_seconds: 5.0,
        }
    }
}

impl WaveprintConfig {
    /// Load a configuration from a TOML file. Missing keys fall back to the
    /// defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter combinations that would break the pipeline.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_rate == 0 {
            anyhow::bail!("sample_rate must be > 0");
        }
        if self.frame_overlap >= self.frame_size {
            anyhow::bail!("frame_overlap must be smaller than frame_size");
        }
        if self.time_max_filter_size % 2 == 0 || self.freq_max_filter_size % 2 == 0 {
            anyhow::bail!("max filter window sizes must be odd");
        }
        if self.time_min_filter_size % 2 == 0 || self.freq_min_filter_size % 2 == 0 {
            anyhow::bail!("min filter window sizes must be odd");
        }
        if self.time_min_filter_size > self.time_max_filter_size {
            anyhow::bail!("time_min_filter_size must not exceed time_max_filter_size");
        }
        if self.min_ratio_threshold >= self.max_ratio_threshold {
            anyhow::bail!("min_ratio_threshold must be < max_ratio_threshold");
        }
        if self.fp_min_time_dist < 1 {
            anyhow::bail!("fp_min_time_dist must be at least 1");
        }
        if self.hit_part_divider == 0 {
            anyhow::bail!("hit_part_divider must be > 0");
        }
        Ok(())
    }

    /// Hop size between consecutive analysis frames, in samples.
    pub fn hop_size(&self) -> usize {
        self.frame_size - self.frame_overlap
    }

    /// Number of frequency bins in the magnitude spectrum.
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2
    }

    /// Convert an analysis frame index to seconds.
    pub fn frame_to_seconds(&self, t: u32) -> f64 {
        t as f64 * self.hop_size() as f64 / self.sample_rate as f64
    }

    /// Center frequency of a spectrum bin, in Hz.
    pub fn bin_to_hz(&self, f: u16) -> f64 {
        f as f64 * self.sample_rate as f64 / self.frame_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WaveprintConfig::default();
        config.validate().unwrap();
        assert_eq!(config.hop_size(), 128);
        assert_eq!(config.num_bins(), 512);
    }

    #[test]
    fn test_frame_timing() {
        let config = WaveprintConfig::default();
        // 128 samples at 16 kHz is 8 ms per frame.
        assert!((config.frame_to_seconds(125) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let config = WaveprintConfig {
            frame_overlap: 1024,
            ..WaveprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sample_rate = 8000\nquery_range = 3").unwrap();
        let config = WaveprintConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.query_range, 3);
        // Unspecified keys keep their defaults.
        assert_eq!(config.frame_size, 1024);
    }
}
