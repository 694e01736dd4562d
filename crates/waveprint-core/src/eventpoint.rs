//! Event point extraction: scale-robust local maxima in the evolving
//! time/frequency magnitude surface.
//!
//! Two filtering passes: per incoming frame, sliding max and min envelopes
//! along the frequency axis; once enough frames are buffered, a second
//! max/min pass along the time axis for the frame at the center of the
//! buffer. A bin is an event point when it is a true 2D local maximum and
//! passes the energy-contrast gates. Frames outside the combined window are
//! evicted, so memory stays O(window), not O(signal).

use crate::config::WaveprintConfig;
use crate::minmax::MinMaxFilter;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A local spectral peak. `t` is the analysis frame index, `f` the
/// frequency bin index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPoint {
    pub t: u32,
    pub f: u16,
    pub magnitude: f32,
}

impl EventPoint {
    pub fn new(t: u32, f: u16, magnitude: f32) -> Self {
        Self { t, f, magnitude }
    }
}

struct BufferedFrame {
    magnitudes: Vec<f32>,
    max_envelope: Vec<f32>,
    min_envelope: Vec<f32>,
}

/// Streaming extractor; feed frames with [`process_frame`] and collect the
/// points with [`finish`].
///
/// [`process_frame`]: EventPointExtractor::process_frame
/// [`finish`]: EventPointExtractor::finish
pub struct EventPointExtractor {
    num_bins: usize,
    time_max_window: usize,
    time_min_window: usize,
    min_ratio_threshold: f32,
    max_ratio_threshold: f32,
    min_energy_for_point: f32,
    refine_frequency: bool,

    vertical_max: MinMaxFilter,
    vertical_min: MinMaxFilter,
    buffer: VecDeque<BufferedFrame>,
    max_horizontal: Vec<f32>,
    min_horizontal: Vec<f32>,
    frames_seen: u32,
    points: Vec<EventPoint>,
}

impl EventPointExtractor {
    pub fn new(config: &WaveprintConfig) -> Self {
        let num_bins = config.num_bins();
        Self {
            num_bins,
            time_max_window: config.time_max_filter_size,
            time_min_window: config.time_min_filter_size,
            min_ratio_threshold: config.min_ratio_threshold,
            max_ratio_threshold: config.max_ratio_threshold,
            min_energy_for_point: config.min_energy_for_point,
            refine_frequency: config.refine_frequency,
            vertical_max: MinMaxFilter::new(config.freq_max_filter_size, num_bins),
            vertical_min: MinMaxFilter::new(config.freq_min_filter_size, num_bins),
            buffer: VecDeque::with_capacity(config.time_max_filter_size),
            max_horizontal: vec![0.0; num_bins],
            min_horizontal: vec![0.0; num_bins],
            frames_seen: 0,
            points: Vec::new(),
        }
    }

    /// Number of frames between a frame entering and being analyzed.
    pub fn latency_frames(&self) -> u32 {
        (self.time_max_window / 2) as u32
    }

    /// Feed the magnitude spectrum of the next analysis frame.
    pub fn process_frame(&mut self, magnitudes: &[f32]) {
        assert_eq!(magnitudes.len(), self.num_bins, "bin count mismatch");

        self.vertical_max.filter(magnitudes);
        let max_envelope = self.vertical_max.max().to_vec();
        self.vertical_min.filter(magnitudes);
        let min_envelope = self.vertical_min.min().to_vec();

        self.buffer.push_back(BufferedFrame {
            magnitudes: magnitudes.to_vec(),
            max_envelope,
            min_envelope,
        });
        self.frames_seen += 1;

        if self.buffer.len() == self.time_max_window {
            self.analyze_center_frame();
            self.buffer.pop_front();
        }
    }

    /// Consume the extractor and return the event points found so far, in
    /// time order. Frames still inside the latency window are not analyzed,
    /// matching the streaming discipline.
    pub fn finish(self) -> Vec<EventPoint> {
        self.points
    }

    fn analyze_center_frame(&mut self) {
        let center = self.time_max_window / 2;
        let t = self.frames_seen - 1 - center as u32;

        // Horizontal max over the full time window.
        self.max_horizontal.fill(f32::MIN);
        for frame in &self.buffer {
            for (h, &v) in self.max_horizontal.iter_mut().zip(&frame.max_envelope) {
                if v > *h {
                    *h = v;
                }
            }
        }

        // Horizontal min over the smaller window centered on the same frame.
        self.min_horizontal.fill(f32::MAX);
        let half_min = self.time_min_window / 2;
        for i in (center - half_min)..=(center + half_min) {
            let frame = &self.buffer[i];
            for (h, &v) in self.min_horizontal.iter_mut().zip(&frame.min_envelope) {
                if v < *h {
                    *h = v;
                }
            }
        }

        let frame_max = self
            .max_horizontal
            .iter()
            .cloned()
            .fold(f32::MIN, f32::max);
        let log_frame_max = frame_max.max(0.0).ln_1p();

        let magnitudes = &self.buffer[center].magnitudes;
        let prev = &self.buffer[center - 1].magnitudes;
        let next = &self.buffer[center + 1].magnitudes;

        for f in 2..self.num_bins - 1 {
            let value = magnitudes[f];
            if value == 0.0 || value != self.max_horizontal[f] {
                continue;
            }

            let log_max = self.max_horizontal[f].ln_1p();
            let log_min = self.min_horizontal[f].max(0.0).ln_1p();
            let ratio = log_min / log_max;
            if ratio <= self.min_ratio_threshold || ratio >= self.max_ratio_threshold {
                continue;
            }
            if value.ln_1p() <= self.min_energy_for_point * log_frame_max {
                continue;
            }

            // Sum the 3x3 neighbourhood for a magnitude estimate that is
            // robust against discretization effects.
            let magnitude = magnitudes[f - 1]
                + magnitudes[f]
                + magnitudes[f + 1]
                + prev[f - 1]
                + prev[f]
                + prev[f + 1]
                + next[f - 1]
                + next[f]
                + next[f + 1];

            let mut bin = f;
            if self.refine_frequency {
                let delta =
                    quadratic_peak_offset(magnitudes[f - 1], magnitudes[f], magnitudes[f + 1]);
                bin = (f as f32 + delta).round() as usize;
            }

            self.points.push(EventPoint::new(t, bin as u16, magnitude));
        }
    }
}

/// Offset of the true peak relative to the center bin, from a quadratic fit
/// through three neighbouring magnitudes. The result lies in [-0.5, 0.5]
/// when the center is a local maximum.
pub fn quadratic_peak_offset(left: f32, center: f32, right: f32) -> f32 {
    let denominator = left - 2.0 * center + right;
    if denominator == 0.0 {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> WaveprintConfig {
        WaveprintConfig {
            frame_size: 128,
            frame_overlap: 64,
            freq_max_filter_size: 7,
            freq_min_filter_size: 3,
            time_max_filter_size: 7,
            time_min_filter_size: 3,
            ..WaveprintConfig::default()
        }
    }

    /// A noise floor with one strong isolated peak at (t, f). The floor is
    /// high enough that the peak's contrast ratio lands inside the gates;
    /// the floor's own wiggle stays above the flatness bound and is
    /// rejected.
    fn synthetic_frames(num_frames: usize, bins: usize, peak_t: usize, peak_f: usize) -> Vec<Vec<f32>> {
        (0..num_frames)
            .map(|t| {
                (0..bins)
                    .map(|f| {
                        let noise = 0.5 + 0.01 * ((t * 31 + f * 17) % 7) as f32;
                        if t == peak_t && f == peak_f {
                            noise + 2.0
                        } else {
                            noise
                        }
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_isolated_peak_is_found() {
        let config = test_config();
        let bins = config.num_bins();
        let mut extractor = EventPointExtractor::new(&config);

        for frame in synthetic_frames(30, bins, 10, 20) {
            extractor.process_frame(&frame);
        }
        let points = extractor.finish();

        assert!(points.iter().any(|p| p.t == 10 && p.f == 20));
    }

    #[test]
    fn test_silence_yields_no_points() {
        let config = test_config();
        let bins = config.num_bins();
        let mut extractor = EventPointExtractor::new(&config);

        for _ in 0..30 {
            extractor.process_frame(&vec![0.0; bins]);
        }
        assert!(extractor.finish().is_empty());
    }

    #[test]
    fn test_flat_energy_is_rejected() {
        // Every bin equal: min/max ratio is 1.0, above the flatness gate.
        let config = test_config();
        let bins = config.num_bins();
        let mut extractor = EventPointExtractor::new(&config);

        for _ in 0..30 {
            extractor.process_frame(&vec![1.0; bins]);
        }
        assert!(extractor.finish().is_empty());
    }

    #[test]
    fn test_memory_stays_bounded() {
        let config = test_config();
        let bins = config.num_bins();
        let mut extractor = EventPointExtractor::new(&config);

        for frame in synthetic_frames(500, bins, 100, 30) {
            extractor.process_frame(&frame);
            assert!(extractor.buffer.len() < config.time_max_filter_size);
        }
    }

    #[test]
    fn test_quadratic_peak_offset() {
        // Symmetric neighbours: peak is centered.
        assert_eq!(quadratic_peak_offset(1.0, 2.0, 1.0), 0.0);
        // Heavier right neighbour pulls the estimate right.
        assert!(quadratic_peak_offset(1.0, 2.0, 1.5) > 0.0);
        // Degenerate (flat) input does not blow up.
        assert_eq!(quadratic_peak_offset(1.0, 1.0, 1.0), 0.0);
    }
}
