// Pipeline start-up errors

use crate::error::{AcquisitionError, ErrorCode, ProcessingError};
use std::fmt;

/// Failure to bring up one stage of the pipeline
///
/// Codes are those of the wrapped stage error, so front ends can treat a
/// pipeline failure exactly like the underlying component failure.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Acquisition(AcquisitionError),
    Processing(ProcessingError),
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::Acquisition(err) => err.code(),
            PipelineError::Processing(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::Acquisition(err) => format!("Acquisition: {}", err.message()),
            PipelineError::Processing(err) => format!("Processing: {}", err.message()),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Acquisition(err) => Some(err),
            PipelineError::Processing(err) => Some(err),
        }
    }
}

impl From<AcquisitionError> for PipelineError {
    fn from(err: AcquisitionError) -> Self {
        PipelineError::Acquisition(err)
    }
}

impl From<ProcessingError> for PipelineError {
    fn from(err: ProcessingError) -> Self {
        PipelineError::Processing(err)
    }
}
