//! Configuration management for the acquisition/training pipeline
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling experimentation with window sizes, thresholds and session timing
//! without recompilation. Every section falls back to defaults field-group by
//! field-group, so a file may override only what it needs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::SliceMode;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// Sensor connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// ThinkGear connector host
    pub host: String,
    /// ThinkGear connector port
    pub port: u16,
    /// Generate pseudo-random samples instead of opening a socket
    pub synthetic: bool,
    /// Samples per second emitted by the synthetic generator
    pub synthetic_rate_hz: u32,
    /// Bytes requested per socket read
    pub read_chunk_size: usize,
    /// Interval between sampling-rate reports
    pub sampling_rate_interval_ms: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Longest partial record carried across reads before it is discarded
    pub max_record_len: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 13854,
            synthetic: false,
            synthetic_rate_hz: 512,
            read_chunk_size: 1000,
            sampling_rate_interval_ms: 1000,
            connect_timeout_ms: 3000,
            max_record_len: 4096,
        }
    }
}

impl AcquisitionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sampling_rate_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_rate_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Windowing and spectral transform parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Samples per window
    pub resolution: usize,
    /// Absolute amplitude at which a window is rejected as an artifact
    pub blink_threshold: i32,
    /// Sample rate used for bin widths (Hz)
    pub sample_rate_hz: u32,
    /// First bin kept (drops DC and near-DC drift)
    pub low_cut: usize,
    /// Exclusive upper bin in live mode
    pub live_high_cut: usize,
    /// Upper frequency used to size the batch-mode slice (Hz)
    pub batch_max_frequency_hz: f32,
    /// Slice policy applied to windows
    pub slice_mode: SliceMode,
    /// Window buffers pre-allocated for the transform worker
    pub window_pool_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            resolution: 250,
            blink_threshold: 150,
            sample_rate_hz: 512,
            low_cut: 2,
            live_high_cut: 50,
            batch_max_frequency_hz: 50.0,
            slice_mode: SliceMode::Live,
            window_pool_size: 8,
        }
    }
}

/// Labeled training session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Delay between `train()` and the start of recording
    pub training_wait_ms: u64,
    /// Length of the recording phase
    pub recording_ms: u64,
    /// Neighbours consulted by the default classifier
    pub knn_neighbors: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            training_wait_ms: 3000,
            recording_ms: 10_000,
            knn_neighbors: 3,
        }
    }
}

impl TrainingConfig {
    pub fn training_wait(&self) -> Duration {
        Duration::from_millis(self.training_wait_ms)
    }

    pub fn recording_time(&self) -> Duration {
        Duration::from_millis(self.recording_ms)
    }
}

/// Broadcast channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Per-subscriber queue capacity for queue/stream subscribers
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration; if the file doesn't exist or the JSON is invalid,
    /// the default configuration is returned and a warning is logged.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/neurosky_config.json")
    }
}
