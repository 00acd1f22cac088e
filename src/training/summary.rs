// SessionSummary - per-session training record for the operator and for persistence

use serde::{Deserialize, Serialize};

/// Outcome of one completed training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub identifier_name: String,
    /// `"<name>_<index>"` key for storing this session's recording
    pub session_label: String,
    pub classifier_name: String,
    /// Wall time spent fitting, in seconds
    pub training_time: f64,
    /// Accuracy of the previous model on this session, if one existed
    pub score_before: Option<f32>,
    /// Accuracy of the refitted model on this session
    pub score_after: Option<f32>,
    /// Feature vectors recorded in this session
    pub samples_size_scored_against: usize,
    /// Feature vectors in the cumulative dataset after this session
    pub total_processed_samples_size: usize,
}

impl SessionSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
