// Training, classifier and recorder error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log a training error with structured context
///
/// Rejections (`AlreadyTraining`, `NotTrained`, `Busy`) are expected during normal
/// operation; callers on hot paths should prefer `log::debug!` for those.
pub fn log_training_error(err: &TrainingError, context: &str) {
    error!(
        "Training error in {}: code={}, component=Trainer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors reported by a `Classifier` implementation
///
/// Error code range: 2051-2054
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// Fit called with no examples
    EmptyDataset,

    /// Feature and target slices differ in length
    LengthMismatch { features: usize, targets: usize },

    /// Feature vector length differs from the fitted dimension
    DimensionMismatch { expected: usize, actual: usize },

    /// Predict or score called before fit
    NotFitted,
}

impl ErrorCode for ClassifierError {
    fn code(&self) -> i32 {
        match self {
            ClassifierError::EmptyDataset => 2051,
            ClassifierError::LengthMismatch { .. } => 2052,
            ClassifierError::DimensionMismatch { .. } => 2053,
            ClassifierError::NotFitted => 2054,
        }
    }

    fn message(&self) -> String {
        match self {
            ClassifierError::EmptyDataset => "Cannot fit on an empty dataset".to_string(),
            ClassifierError::LengthMismatch { features, targets } => format!(
                "Feature/target length mismatch: {} features, {} targets",
                features, targets
            ),
            ClassifierError::DimensionMismatch { expected, actual } => format!(
                "Feature dimension mismatch: expected {}, got {}",
                expected, actual
            ),
            ClassifierError::NotFitted => "Classifier has not been fitted".to_string(),
        }
    }
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClassifierError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ClassifierError {}

/// Trainer errors
///
/// Error code range: 2001-2010
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// `train()` called while a session is already running
    AlreadyTraining,

    /// Prediction requested before the first completed fit
    NotTrained,

    /// Prediction requested while the classifier is being refitted
    Busy,

    /// Label name was never registered
    UnknownIdentifier { name: String },

    /// Inference failed for one feature vector
    PredictionFailed { source: ClassifierError },

    /// Fitting failed; the session did not complete
    FitFailed { source: ClassifierError },

    /// Session was interrupted by `close()`
    Cancelled,

    /// Trainer state lock was poisoned
    StatePoisoned,

    /// Session thread could not be spawned or panicked
    ThreadFailed { details: String },

    /// Operation on a closed trainer
    Closed,
}

impl TrainingError {
    /// Whether this is a rejected operation rather than a failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TrainingError::AlreadyTraining | TrainingError::NotTrained | TrainingError::Busy
        )
    }
}

impl ErrorCode for TrainingError {
    fn code(&self) -> i32 {
        match self {
            TrainingError::AlreadyTraining => 2001,
            TrainingError::NotTrained => 2002,
            TrainingError::Busy => 2003,
            TrainingError::UnknownIdentifier { .. } => 2004,
            TrainingError::PredictionFailed { .. } => 2005,
            TrainingError::FitFailed { .. } => 2006,
            TrainingError::Cancelled => 2007,
            TrainingError::StatePoisoned => 2008,
            TrainingError::ThreadFailed { .. } => 2009,
            TrainingError::Closed => 2010,
        }
    }

    fn message(&self) -> String {
        match self {
            TrainingError::AlreadyTraining => "Already training".to_string(),
            TrainingError::NotTrained => "Classifier not trained yet".to_string(),
            TrainingError::Busy => "Classifier is fitting".to_string(),
            TrainingError::UnknownIdentifier { name } => {
                format!("Unknown identifier: {}", name)
            }
            TrainingError::PredictionFailed { source } => {
                format!("Prediction failed, prediction not performed: {}", source.message())
            }
            TrainingError::FitFailed { source } => {
                format!("Fitting failed: {}", source.message())
            }
            TrainingError::Cancelled => "Training session cancelled".to_string(),
            TrainingError::StatePoisoned => "Trainer state lock poisoned".to_string(),
            TrainingError::ThreadFailed { details } => {
                format!("Training thread failed: {}", details)
            }
            TrainingError::Closed => "Trainer closed".to_string(),
        }
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrainingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TrainingError {}

/// Channel recorder errors
///
/// Error code range: 2071-2072
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderError {
    /// A recording is already in progress on this recorder
    AlreadyRecording,

    /// The recorded channel was closed before the recording started
    ChannelClosed,
}

impl ErrorCode for RecorderError {
    fn code(&self) -> i32 {
        match self {
            RecorderError::AlreadyRecording => 2071,
            RecorderError::ChannelClosed => 2072,
        }
    }

    fn message(&self) -> String {
        match self {
            RecorderError::AlreadyRecording => "Already recording...".to_string(),
            RecorderError::ChannelClosed => "Cannot record a closed channel".to_string(),
        }
    }
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecorderError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RecorderError {}
