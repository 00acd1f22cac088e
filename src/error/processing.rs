// Spectral processing error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a processing error with structured context
pub fn log_processing_error(err: &ProcessingError, context: &str) {
    error!(
        "Processing error in {}: code={}, component=SpectralProcessor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Spectral processing errors
///
/// Artifact-rejected windows are not errors; they are simply not emitted.
///
/// Error code range: 3001-3005
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingError {
    /// Processor configuration cannot produce feature vectors
    InvalidConfig { reason: String },

    /// Batch passed to a decomposition has an unusable shape
    InvalidBatch { reason: String },

    /// Decomposition did not converge or produced a degenerate basis
    DecompositionFailed { reason: String },

    /// Worker thread could not be spawned
    WorkerFailed { details: String },

    /// `start()` called on a processor that was already started
    AlreadyStarted,
}

impl ErrorCode for ProcessingError {
    fn code(&self) -> i32 {
        match self {
            ProcessingError::InvalidConfig { .. } => 3001,
            ProcessingError::InvalidBatch { .. } => 3002,
            ProcessingError::DecompositionFailed { .. } => 3003,
            ProcessingError::WorkerFailed { .. } => 3004,
            ProcessingError::AlreadyStarted => 3005,
        }
    }

    fn message(&self) -> String {
        match self {
            ProcessingError::InvalidConfig { reason } => {
                format!("Invalid processor configuration: {}", reason)
            }
            ProcessingError::InvalidBatch { reason } => format!("Invalid batch: {}", reason),
            ProcessingError::DecompositionFailed { reason } => {
                format!("Decomposition failed: {}", reason)
            }
            ProcessingError::WorkerFailed { details } => {
                format!("Transform worker failed: {}", details)
            }
            ProcessingError::AlreadyStarted => "Processor already started".to_string(),
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProcessingError {}
