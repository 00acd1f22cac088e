// Training module - labeled sessions and online classification
//
// The Trainer turns "train <label> now" requests into labeled examples:
// it waits for the operator, records every incoming feature vector under the
// label's target, scores the existing model on the new session, then refits on
// everything recorded so far. Outside a recording, feature vectors are classified
// and published as predictions.

pub mod classifier;
pub mod registry;
pub mod state;
pub mod summary;
pub mod trainer;

pub use classifier::{Classifier, KnnClassifier};
pub use registry::{Identifier, IdentifierRegistry};
pub use state::{TrainerState, TrainerStatus};
pub use summary::SessionSummary;
pub use trainer::{Trainer, TrainingSession};

use serde::{Deserialize, Serialize};

/// Classified feature vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub identifier: String,
    pub target: usize,
}
