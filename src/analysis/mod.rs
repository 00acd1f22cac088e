// Analysis module - raw samples to frequency-domain feature vectors
//
// Architecture:
// - SpectralProcessor: ingestion path that fills fixed-size windows and hands
//   full ones to a single transform worker through a pre-allocated WindowPool
// - SpectralTransform: artifact gate -> FFT magnitude -> bin slice
// - decomposition: batch-only standardize / PCA / FastICA over feature vectors

pub mod decomposition;
pub mod fft;
pub mod processor;
pub mod spectral;
pub mod window_pool;

pub use decomposition::{ica, pca, standardize};
pub use fft::FftProcessor;
pub use processor::{ProcessorStats, SpectralProcessor};
pub use spectral::{SpectralTransform, TransformOutcome};

use serde::{Deserialize, Serialize};

/// Magnitudes over the configured bin slice of one accepted window
pub type FeatureVector = Vec<f32>;

/// How the upper edge of the bin slice is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceMode {
    /// Fixed upper bin index (`live_high_cut`)
    #[default]
    Live,
    /// Upper bin derived from the number of bins below `batch_max_frequency_hz`
    Batch,
}
