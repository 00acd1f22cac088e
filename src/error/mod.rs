// Error types for the neurosky trainer
//
// This module defines custom error types for acquisition, processing and training
// operations, providing structured error handling with numeric codes so that a
// front end can react to failures without string matching.

mod acquisition;
mod pipeline;
mod processing;
mod training;

pub use acquisition::{log_acquisition_error, AcquisitionError};
pub use pipeline::PipelineError;
pub use processing::{log_processing_error, ProcessingError};
pub use training::{log_training_error, ClassifierError, RecorderError, TrainingError};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// component boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
