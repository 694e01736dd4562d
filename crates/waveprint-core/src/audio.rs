//! Frame sources: push-style producers of fixed-size, overlapping PCM frames.
//!
//! Decoding and resampling are external concerns; the pipeline only consumes
//! mono f32 frames at a declared sample rate. `WavFrameSource` is the
//! boundary implementation over WAV files.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// A producer of fixed-size, optionally overlapping audio frames.
///
/// Frames are pushed into the consumer in order. A source may start at a
/// time offset and stop after a duration limit, which is how partial and
/// streaming ("monitor") queries are expressed.
pub trait FrameSource {
    fn sample_rate(&self) -> u32;
    fn frame_size(&self) -> usize;

    /// Push every frame into `consumer` until the source is exhausted.
    fn run(&mut self, consumer: &mut dyn FnMut(&[f32])) -> Result<()>;
}

/// Frame source over an in-memory sample buffer.
pub struct SampleFrameSource {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
}

impl SampleFrameSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, frame_size: usize, hop_size: usize) -> Self {
        Self {
            samples,
            sample_rate,
            frame_size,
            hop_size,
        }
    }
}

impl FrameSource for SampleFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn run(&mut self, consumer: &mut dyn FnMut(&[f32])) -> Result<()> {
        let mut start = 0;
        while start + self.frame_size <= self.samples.len() {
            consumer(&self.samples[start..start + self.frame_size]);
            start += self.hop_size;
        }
        Ok(())
    }
}

/// Frame source over a WAV file, decoded with `hound`.
///
/// Stereo input is averaged to mono. The file's sample rate must match the
/// configured rate; resampling is out of scope here.
pub struct WavFrameSource {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
}

impl WavFrameSource {
    /// Open `path` and read the whole file.
    pub fn open(path: &Path, expected_rate: u32, frame_size: usize, hop_size: usize) -> Result<Self> {
        Self::open_range(path, expected_rate, frame_size, hop_size, 0.0, f64::MAX)
    }

    /// Open `path`, skipping `offset_seconds` and reading at most
    /// `duration_seconds` of audio.
    pub fn open_range(
        path: &Path,
        expected_rate: u32,
        frame_size: usize,
        hop_size: usize,
        offset_seconds: f64,
        duration_seconds: f64,
    ) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();

        if spec.sample_rate != expected_rate {
            bail!(
                "{}: sample rate is {} Hz, expected {} Hz (resample before indexing)",
                path.display(),
                spec.sample_rate,
                expected_rate
            );
        }

        let channels = spec.channels as usize;
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("failed to decode {}", path.display()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("failed to decode {}", path.display()))?
            }
        };

        let mut samples: Vec<f32> = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        let skip = (offset_seconds * expected_rate as f64) as usize;
        samples = if skip >= samples.len() {
            Vec::new()
        } else {
            samples.split_off(skip)
        };
        if duration_seconds != f64::MAX {
            let limit = (duration_seconds * expected_rate as f64) as usize;
            samples.truncate(limit);
        }

        Ok(Self {
            samples,
            sample_rate: expected_rate,
            frame_size,
            hop_size,
        })
    }

    /// Total duration of a WAV file in seconds, without decoding the samples.
    pub fn duration_of(path: &Path) -> Result<f64> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        let frames = reader.duration() as f64;
        Ok(frames / spec.sample_rate as f64)
    }
}

impl FrameSource for WavFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn run(&mut self, consumer: &mut dyn FnMut(&[f32])) -> Result<()> {
        let mut start = 0;
        while start + self.frame_size <= self.samples.len() {
            consumer(&self.samples[start..start + self.frame_size]);
            start += self.hop_size;
        }
        Ok(())
    }
}
