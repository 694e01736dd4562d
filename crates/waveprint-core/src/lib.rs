//! Core fingerprinting pipeline: frames → spectra → event points →
//! fingerprints, plus the aligner that turns raw index hits into ranked
//! matches.
//!
//! This crate is pure computation; persistence lives elsewhere. The
//! pipeline is deterministic: identical samples and configuration always
//! produce identical fingerprints.

pub mod audio;
pub mod config;
pub mod eventpoint;
pub mod fingerprint;
pub mod matching;
pub mod minmax;
pub mod spectral;

use anyhow::Result;
use log::debug;

use audio::FrameSource;
use config::WaveprintConfig;
use eventpoint::{EventPoint, EventPointExtractor};
use fingerprint::{Fingerprint, FingerprintBuilder};
use spectral::SpectralAnalyzer;

/// Run a frame source through spectral analysis and event point extraction.
pub fn extract_event_points(
    source: &mut dyn FrameSource,
    config: &WaveprintConfig,
) -> Result<Vec<EventPoint>> {
    let mut analyzer = SpectralAnalyzer::new(config.frame_size);
    let mut extractor = EventPointExtractor::new(config);
    source.run(&mut |frame| {
        let spectrum = analyzer.magnitude_spectrum(frame);
        extractor.process_frame(&spectrum);
    })?;
    Ok(extractor.finish())
}

/// Full pipeline: frames to fingerprints.
pub fn extract_fingerprints(
    source: &mut dyn FrameSource,
    config: &WaveprintConfig,
) -> Result<Vec<Fingerprint>> {
    let points = extract_event_points(source, config)?;
    let builder = FingerprintBuilder::new(config);
    let prints = builder.build(&points);
    debug!("{} event points, {} fingerprints", points.len(), prints.len());
    Ok(prints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::SampleFrameSource;
    use std::f32::consts::PI;

    /// A few seconds of audio with enough spectral structure to fingerprint:
    /// short tone bursts at changing frequencies over a broadband noise
    /// floor. Pure tones over digital silence fail the extractor's contrast
    /// gates, as they should.
    fn tone_sequence(seconds: f64, sample_rate: u32) -> Vec<f32> {
        let total = (seconds * sample_rate as f64) as usize;
        let mut noise_state = 0x2545_f491u32;
        (0..total)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let burst = (t / 0.25) as usize;
                let freq = 400.0 + (burst % 13) as f32 * 180.0;
                let envelope = ((t % 0.25) * 4.0 * PI).sin().abs();
                noise_state = noise_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (noise_state >> 16) as f32 / 32768.0 - 1.0;
                0.6 * envelope * (2.0 * PI * freq * t).sin() + 0.3 * noise
            })
            .collect()
    }

    /// Default parameters except for the contrast gates, which are tuned
    /// for dense produced music and starve on sparse synthetic spectra.
    fn relaxed_config() -> WaveprintConfig {
        WaveprintConfig {
            min_ratio_threshold: 0.005,
            max_ratio_threshold: 0.995,
            min_energy_for_point: 0.05,
            ..WaveprintConfig::default()
        }
    }

    #[test]
    fn test_pipeline_produces_fingerprints() {
        let config = relaxed_config();
        let samples = tone_sequence(10.0, config.sample_rate);
        let mut source = SampleFrameSource::new(
            samples,
            config.sample_rate,
            config.frame_size,
            config.hop_size(),
        );

        let prints = extract_fingerprints(&mut source, &config).unwrap();
        assert!(!prints.is_empty());
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let config = relaxed_config();
        let samples = tone_sequence(5.0, config.sample_rate);

        let run = |samples: Vec<f32>| {
            let mut source = SampleFrameSource::new(
                samples,
                config.sample_rate,
                config.frame_size,
                config.hop_size(),
            );
            extract_fingerprints(&mut source, &config).unwrap()
        };

        let a = run(samples.clone());
        let b = run(samples);
        assert_eq!(a.len(), b.len());
        for (fa, fb) in a.iter().zip(&b) {
            assert_eq!(fa.hash(), fb.hash());
            assert_eq!(fa.t1(), fb.t1());
        }
    }

    #[test]
    fn test_silence_produces_nothing() {
        let config = WaveprintConfig::default();
        let mut source = SampleFrameSource::new(
            vec![0.0; 16000 * 5],
            config.sample_rate,
            config.frame_size,
            config.hop_size(),
        );

        let prints = extract_fingerprints(&mut source, &config).unwrap();
        assert!(prints.is_empty());
    }
}
