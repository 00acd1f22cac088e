// Trainer state machine and the events published on its status channel
//
// Idle -> Waiting -> Recording -> [Scoring] -> Fitting -> Idle
//
// Scoring only runs once a model exists. Cancellation (close) during Waiting or
// Recording and fit failures both return to Idle.

use serde::{Deserialize, Serialize};

use super::summary::SessionSummary;
use crate::error::TrainingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrainerState {
    #[default]
    Idle,
    /// Operator gets ready; feature vectors are still classified
    Waiting,
    /// Feature vectors are labeled and stored
    Recording,
    /// Current model measured against the new session
    Scoring,
    /// Model refitted on the cumulative dataset; predictions report Busy
    Fitting,
}

impl TrainerState {
    /// Whether a session is in progress
    pub fn is_active(self) -> bool {
        self != TrainerState::Idle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainerStatus {
    /// Entered `state`; `identifier` names the label being trained
    Phase {
        state: TrainerState,
        identifier: Option<String>,
    },
    /// Accuracy of the previous model on the session just recorded
    Scored { identifier: String, score: f32 },
    /// Session finished and the model was refitted
    Completed(SessionSummary),
    /// A request was refused without changing state
    Rejected(TrainingError),
    /// The session ended without a new model
    Failed(TrainingError),
}
