// SpectralTransform - window -> feature vector
//
// Steps:
// 1. Artifact gate: a window whose peak reaches +/- blink_threshold (eye blinks,
//    electrode movement) is rejected before any FFT work
// 2. One-sided magnitude spectrum, bin width = sample_rate / window_len
// 3. Slice [low_cut, hi): bins below low_cut hold DC and slow drift
//
// hi is either a fixed bin index (SliceMode::Live) or derived from the number of
// bins below a frequency limit (SliceMode::Batch). An empty slice is a rejection.

use crate::acquisition::Sample;
use crate::config::ProcessingConfig;
use crate::error::ProcessingError;

use super::fft::FftProcessor;
use super::{FeatureVector, SliceMode};

/// Result of transforming one window
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Features(FeatureVector),
    /// Amplitude reached the blink threshold
    Artifact { min: Sample, max: Sample },
    /// Window too short for the configured slice
    Empty,
}

pub struct SpectralTransform {
    blink_threshold: Sample,
    low_cut: usize,
    live_high_cut: usize,
    batch_max_frequency_hz: f32,
    fft: FftProcessor,
}

impl SpectralTransform {
    /// # Errors
    /// `InvalidConfig` for a non-positive blink threshold, an empty live slice or a
    /// non-positive batch frequency limit
    pub fn new(config: &ProcessingConfig) -> Result<Self, ProcessingError> {
        if config.blink_threshold <= 0 {
            return Err(ProcessingError::InvalidConfig {
                reason: format!("blink_threshold must be positive, got {}", config.blink_threshold),
            });
        }
        if config.live_high_cut <= config.low_cut {
            return Err(ProcessingError::InvalidConfig {
                reason: format!(
                    "live_high_cut ({}) must exceed low_cut ({})",
                    config.live_high_cut, config.low_cut
                ),
            });
        }
        if config.batch_max_frequency_hz <= 0.0 {
            return Err(ProcessingError::InvalidConfig {
                reason: "batch_max_frequency_hz must be positive".to_string(),
            });
        }

        Ok(Self {
            blink_threshold: config.blink_threshold,
            low_cut: config.low_cut,
            live_high_cut: config.live_high_cut,
            batch_max_frequency_hz: config.batch_max_frequency_hz,
            fft: FftProcessor::new(),
        })
    }

    /// `Some((min, max))` when the window trips the artifact gate
    pub fn artifact_bounds(&self, window: &[Sample]) -> Option<(Sample, Sample)> {
        let max = *window.iter().max()?;
        let min = *window.iter().min()?;
        if max >= self.blink_threshold || min <= -self.blink_threshold {
            Some((min, max))
        } else {
            None
        }
    }

    pub fn transform(&self, window: &[Sample], sample_rate_hz: u32, mode: SliceMode) -> TransformOutcome {
        if window.is_empty() {
            return TransformOutcome::Empty;
        }
        if let Some((min, max)) = self.artifact_bounds(window) {
            return TransformOutcome::Artifact { min, max };
        }

        let (lo, hi) = self.slice_bounds(window.len(), sample_rate_hz, mode);
        if hi <= lo {
            return TransformOutcome::Empty;
        }

        let samples: Vec<f32> = window.iter().map(|&s| s as f32).collect();
        let spectrum = self.fft.magnitude_spectrum(&samples);
        TransformOutcome::Features(spectrum[lo..hi].to_vec())
    }

    /// Bin range `[lo, hi)` for a window of `window_len` samples
    ///
    /// `hi` never exceeds the one-sided spectrum length `window_len / 2 + 1`.
    pub fn slice_bounds(&self, window_len: usize, sample_rate_hz: u32, mode: SliceMode) -> (usize, usize) {
        let spectrum_len = window_len / 2 + 1;
        let hi = match mode {
            SliceMode::Live => self.live_high_cut,
            SliceMode::Batch => batch_high_cut(window_len, sample_rate_hz, self.batch_max_frequency_hz),
        };
        (self.low_cut, hi.min(spectrum_len))
    }
}

/// Bins below `max_frequency_hz`, rounded to the nearest multiple of ten
///
/// A count ending in 5 goes to the even multiple (25 -> 20, 35 -> 40).
pub fn batch_high_cut(window_len: usize, sample_rate_hz: u32, max_frequency_hz: f32) -> usize {
    if window_len == 0 || sample_rate_hz == 0 {
        return 0;
    }
    let bin_width = sample_rate_hz as f32 / window_len as f32;
    let below = (0..=window_len / 2)
        .take_while(|&k| (k as f32) * bin_width < max_frequency_hz)
        .count();
    let base = below - below % 10;
    match below % 10 {
        6..=9 => base + 10,
        5 if (base / 10) % 2 == 1 => base + 10,
        _ => base,
    }
}
