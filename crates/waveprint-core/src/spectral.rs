//! Spectral analysis: one magnitude spectrum per audio frame.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Turns fixed-size audio frames into magnitude spectra.
///
/// The FFT plan, window and scratch buffers are allocated once and reused
/// across frames. Output is deterministic for identical input samples.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    frame_size: usize,
}

impl SpectralAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            window: hann_window(frame_size),
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            frame_size,
        }
    }

    /// Number of frequency bins in the output spectrum.
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2
    }

    /// Compute the magnitude spectrum of one frame.
    ///
    /// `frame` must contain exactly `frame_size` samples.
    pub fn magnitude_spectrum(&mut self, frame: &[f32]) -> Vec<f32> {
        assert_eq!(frame.len(), self.frame_size, "frame size mismatch");

        for (i, (&sample, &w)) in frame.iter().zip(self.window.iter()).enumerate() {
            self.buffer[i] = Complex::new(sample * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer[..self.frame_size / 2]
            .iter()
            .map(|c| c.norm())
            .collect()
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
