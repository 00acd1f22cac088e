// NeuroSky Trainer Core - EEG acquisition, spectral features and labeled training
// Sensor samples flow through a windowed FFT stage into an online classifier

// Module declarations
pub mod acquisition;
pub mod analysis;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod shutdown;
pub mod training;

// Re-exports for convenience
pub use acquisition::{Connector, ConnectorState, ConnectorStatus, Sample, SignalQuality};
pub use analysis::{FeatureVector, SliceMode, SpectralProcessor};
pub use channel::BroadcastChannel;
pub use config::AppConfig;
pub use engine::{Pipeline, PipelineEvent};
pub use error::ErrorCode;
pub use training::{Classifier, KnnClassifier, Prediction, SessionSummary, Trainer, TrainerState};
