// Trainer - labeled training sessions over a pluggable classifier
//
// Locking:
// - `core` guards state, registry and both labeled sets. It is held only for
//   short bookkeeping, never across a wait or a fit.
// - `classifier` is locked by the session thread to score and fit. predict()
//   only try-locks it, so a prediction racing a refit reports Busy instead of
//   stalling the feature pipeline.
//
// The cumulative dataset is appended to only while Recording and read only by the
// Scoring/Fitting phases of the same session, so a rejected or cancelled train()
// never corrupts it.
//
// Ending a session: the session thread returns the core to Idle and marks itself
// as `settling`, then publishes the outcome and the Idle phase. train() from any
// other thread waits on `settled` until both are out, so a new Waiting never
// precedes the old Idle. Status callbacks run on the session thread and may call
// train() directly; the Idle phase is then skipped since a newer session owns
// the trainer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use log::{debug, info, warn};

use super::classifier::{Classifier, KnnClassifier};
use super::registry::{Identifier, IdentifierRegistry};
use super::state::{TrainerState, TrainerStatus};
use super::summary::SessionSummary;
use super::Prediction;
use crate::analysis::FeatureVector;
use crate::channel::BroadcastChannel;
use crate::config::{ChannelConfig, TrainingConfig};
use crate::error::{log_training_error, ErrorCode, TrainingError};
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Default)]
struct LabeledSet {
    features: Vec<FeatureVector>,
    targets: Vec<usize>,
}

impl LabeledSet {
    fn push(&mut self, features: FeatureVector, target: usize) {
        self.features.push(features);
        self.targets.push(target);
    }

    fn clear(&mut self) {
        self.features.clear();
        self.targets.clear();
    }

    fn len(&self) -> usize {
        self.features.len()
    }

    fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Default)]
struct TrainerCore {
    state: TrainerState,
    registry: IdentifierRegistry,
    /// Target of the session in progress
    current: Option<usize>,
    session: LabeledSet,
    dataset: LabeledSet,
    trained: bool,
    summaries: Vec<SessionSummary>,
    closed: bool,
    /// Sessions admitted so far
    generation: u64,
    /// Session thread still announcing its return to Idle
    settling: Option<ThreadId>,
}

impl TrainerCore {
    /// Back to Idle; other threads stay out of train() until `announce_idle`
    fn settle(&mut self) -> u64 {
        self.state = TrainerState::Idle;
        self.current = None;
        self.session.clear();
        self.settling = Some(thread::current().id());
        self.generation
    }
}

struct TrainerShared {
    config: TrainingConfig,
    core: Mutex<TrainerCore>,
    settled: Condvar,
    classifier: Mutex<Box<dyn Classifier>>,
    classifier_name: String,
    predictions: Arc<BroadcastChannel<Prediction>>,
    status: Arc<BroadcastChannel<TrainerStatus>>,
    shutdown: ShutdownSignal,
}

/// Drives labeled training sessions and classifies feature vectors between them
pub struct Trainer {
    shared: Arc<TrainerShared>,
    active: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Trainer {
    /// Trainer backed by a k-nearest-neighbour classifier
    pub fn new(config: TrainingConfig, channel_config: &ChannelConfig) -> Self {
        let classifier = KnnClassifier::new(config.knn_neighbors);
        Self::with_classifier(config, channel_config, Box::new(classifier))
    }

    pub fn with_classifier(
        config: TrainingConfig,
        channel_config: &ChannelConfig,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        let classifier_name = classifier.name().to_string();
        let capacity = channel_config.queue_capacity;
        Self {
            shared: Arc::new(TrainerShared {
                config,
                core: Mutex::new(TrainerCore::default()),
                settled: Condvar::new(),
                classifier: Mutex::new(classifier),
                classifier_name,
                predictions: Arc::new(BroadcastChannel::new("predictions", capacity)),
                status: Arc::new(BroadcastChannel::new("trainer_status", capacity)),
                shutdown: ShutdownSignal::new(),
            }),
            active: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a label and return its classifier target
    pub fn register(&self, name: &str) -> Result<usize, TrainingError> {
        let target = self.shared.lock_core()?.registry.register(name);
        info!("[Trainer] Registered '{}' as target {}", name, target);
        Ok(target)
    }

    /// Start a training session for `name` on a background thread
    ///
    /// # Errors
    /// - `AlreadyTraining` while another session is in progress (also published
    ///   as `TrainerStatus::Rejected`)
    /// - `UnknownIdentifier` if `name` was never registered
    /// - `Closed` after `close()`
    ///
    /// May be called from a status callback, e.g. to start the next label on
    /// `Completed`.
    pub fn train(&self, name: &str) -> Result<TrainingSession, TrainingError> {
        let target = {
            let mut core = self.shared.lock_core()?;
            let current = thread::current().id();
            while core.settling.is_some_and(|id| id != current) {
                core = self
                    .shared
                    .settled
                    .wait(core)
                    .map_err(|_| TrainingError::StatePoisoned)?;
            }
            if core.closed {
                return Err(TrainingError::Closed);
            }
            if core.state.is_active() {
                drop(core);
                let err = TrainingError::AlreadyTraining;
                warn!("[Trainer] train('{}') rejected: {}", name, err.message());
                self.shared.status.publish(TrainerStatus::Rejected(err.clone()));
                return Err(err);
            }
            let target = core
                .registry
                .target(name)
                .ok_or_else(|| TrainingError::UnknownIdentifier {
                    name: name.to_string(),
                })?;
            core.state = TrainerState::Waiting;
            core.current = Some(target);
            core.generation += 1;
            target
        };
        self.shared.publish_phase(TrainerState::Waiting, Some(name));

        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            // Already back to Idle; this only reaps the thread. From a status
            // callback the previous session is this thread, which ends on its own.
            if previous.thread().id() != thread::current().id() && previous.join().is_err() {
                warn!("[Trainer] Previous session thread panicked");
            }
        }

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let identifier = name.to_string();
        let spawned = thread::Builder::new()
            .name("neurosky-training".to_string())
            .spawn(move || {
                let result = shared.run_session(target, &identifier);
                // The caller may have dropped its session handle
                let _ = tx.send(result);
            });

        match spawned {
            Ok(handle) => {
                *active = Some(handle);
                info!("[Trainer] Training '{}' (target {})", name, target);
                Ok(TrainingSession {
                    identifier: name.to_string(),
                    result: rx,
                })
            }
            Err(e) => {
                drop(active);
                let err = TrainingError::ThreadFailed {
                    details: e.to_string(),
                };
                log_training_error(&err, "train");
                let generation = self.shared.recover_core().settle();
                self.shared.announce_idle(generation, None);
                Err(err)
            }
        }
    }

    /// Route one feature vector
    ///
    /// While Recording it is stored under the current label; otherwise it is
    /// classified. Rejected or failed predictions are logged and dropped.
    pub fn add_feature_vector(&self, features: FeatureVector) {
        {
            let Ok(mut core) = self.shared.lock_core() else {
                return;
            };
            if core.state == TrainerState::Recording {
                if let Some(target) = core.current {
                    core.session.push(features.clone(), target);
                    core.dataset.push(features, target);
                }
                return;
            }
        }

        if let Err(err) = self.predict(&features) {
            debug!("[Trainer] No prediction: {}", err.message());
        }
    }

    /// Classify `features` and publish the result on the predictions channel
    ///
    /// # Errors
    /// - `NotTrained` before the first completed session
    /// - `Busy` while the classifier is being scored or refitted
    /// - `PredictionFailed` if the classifier rejects the input
    pub fn predict(&self, features: &[f32]) -> Result<String, TrainingError> {
        {
            let core = self.shared.lock_core()?;
            if core.closed {
                return Err(TrainingError::Closed);
            }
            if core.state == TrainerState::Fitting {
                return Err(TrainingError::Busy);
            }
            if !core.trained {
                return Err(TrainingError::NotTrained);
            }
        }

        let target = {
            let classifier = match self.shared.classifier.try_lock() {
                Ok(classifier) => classifier,
                Err(TryLockError::WouldBlock) => return Err(TrainingError::Busy),
                Err(TryLockError::Poisoned(_)) => return Err(TrainingError::StatePoisoned),
            };
            classifier.predict(features).map_err(|source| {
                let err = TrainingError::PredictionFailed { source };
                log_training_error(&err, "predict");
                err
            })?
        };

        let identifier = self
            .shared
            .lock_core()?
            .registry
            .name_of(target)
            .map(str::to_string)
            .ok_or_else(|| TrainingError::UnknownIdentifier {
                name: format!("target {}", target),
            })?;

        self.shared.predictions.publish(Prediction {
            identifier: identifier.clone(),
            target,
        });
        Ok(identifier)
    }

    /// Drop every recorded example; the fitted model is kept
    ///
    /// # Errors
    /// `AlreadyTraining` while a session is in progress
    pub fn clear_data(&self) -> Result<(), TrainingError> {
        let mut core = self.shared.lock_core()?;
        if core.state.is_active() {
            return Err(TrainingError::AlreadyTraining);
        }
        let cleared = core.dataset.len();
        core.session.clear();
        core.dataset.clear();
        info!("[Trainer] Cleared {} recorded examples", cleared);
        Ok(())
    }

    pub fn state(&self) -> TrainerState {
        self.shared.read_core(|core| core.state).unwrap_or_default()
    }

    pub fn is_trained(&self) -> bool {
        self.shared.read_core(|core| core.trained).unwrap_or(false)
    }

    /// Examples in the cumulative dataset
    pub fn dataset_len(&self) -> usize {
        self.shared.read_core(|core| core.dataset.len()).unwrap_or(0)
    }

    pub fn target(&self, name: &str) -> Option<usize> {
        self.shared
            .read_core(|core| core.registry.target(name))
            .ok()
            .flatten()
    }

    pub fn session_count(&self, name: &str) -> Option<u32> {
        self.shared
            .read_core(|core| core.registry.session_count(name))
            .ok()
            .flatten()
    }

    pub fn session_label(&self, name: &str) -> Option<String> {
        self.shared
            .read_core(|core| core.registry.session_label(name))
            .ok()
            .flatten()
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        self.shared
            .read_core(|core| core.registry.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Summaries of every completed session, oldest first
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.shared
            .read_core(|core| core.summaries.clone())
            .unwrap_or_default()
    }

    pub fn classifier_name(&self) -> &str {
        &self.shared.classifier_name
    }

    pub fn predictions(&self) -> &Arc<BroadcastChannel<Prediction>> {
        &self.shared.predictions
    }

    pub fn status(&self) -> &Arc<BroadcastChannel<TrainerStatus>> {
        &self.shared.status
    }

    /// Cancel any session in progress, join its thread and close both channels.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.recover_core().closed = true;
        self.shared.shutdown.trigger();

        let handle = lock(&self.active).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("[Trainer] Closed from the session thread");
            } else if handle.join().is_err() {
                let err = TrainingError::ThreadFailed {
                    details: "training session panicked".to_string(),
                };
                log_training_error(&err, "close");
            }
        }

        self.shared.predictions.close();
        self.shared.status.close();
        info!(
            "[Trainer] Closed after {} completed sessions",
            self.shared.recover_core().summaries.len()
        );
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        self.close();
    }
}

impl TrainerShared {
    fn run_session(&self, target: usize, name: &str) -> Result<SessionSummary, TrainingError> {
        if self.shutdown.wait_timeout(self.config.training_wait()) {
            return Err(self.cancel(name));
        }

        {
            let mut core = self.lock_core()?;
            core.session.clear();
            core.state = TrainerState::Recording;
        }
        self.publish_phase(TrainerState::Recording, Some(name));
        info!(
            "[Trainer] Recording '{}' for {:?}",
            name,
            self.config.recording_time()
        );

        if self.shutdown.wait_timeout(self.config.recording_time()) {
            return Err(self.cancel(name));
        }

        let (session, trained, session_label) = {
            let mut core = self.lock_core()?;
            let trained = core.trained;
            core.state = if trained {
                TrainerState::Scoring
            } else {
                TrainerState::Fitting
            };
            let label = core
                .registry
                .session_label(name)
                .unwrap_or_else(|| name.to_string());
            (core.session.clone(), trained, label)
        };

        let score_before = if trained {
            self.publish_phase(TrainerState::Scoring, Some(name));
            let score = self.score(&session);
            if let Some(score) = score {
                info!("[Trainer] Score on '{}' before fitting: {:.3}", name, score);
                self.status.publish(TrainerStatus::Scored {
                    identifier: name.to_string(),
                    score,
                });
            }
            self.lock_core()?.state = TrainerState::Fitting;
            score
        } else {
            None
        };
        self.publish_phase(TrainerState::Fitting, Some(name));

        let dataset = self.lock_core()?.dataset.clone();
        let started = Instant::now();
        let fitted = self
            .lock_classifier()?
            .fit(&dataset.features, &dataset.targets);
        let training_time = started.elapsed().as_secs_f64();

        if let Err(source) = fitted {
            let err = TrainingError::FitFailed { source };
            log_training_error(&err, "fit");
            let generation = self.recover_core().settle();
            self.announce_idle(generation, Some(TrainerStatus::Failed(err.clone())));
            return Err(err);
        }

        let score_after = self.score(&session);
        let (summary, generation) = {
            let mut core = self.lock_core()?;
            core.trained = true;
            core.registry.complete_session(target);
            let summary = SessionSummary {
                identifier_name: name.to_string(),
                session_label,
                classifier_name: self.classifier_name.clone(),
                training_time,
                score_before,
                score_after,
                samples_size_scored_against: session.len(),
                total_processed_samples_size: dataset.len(),
            };
            core.summaries.push(summary.clone());
            (summary, core.settle())
        };

        info!(
            "[Trainer] Fitted '{}' on {} examples in {:.3}s (score {:?} -> {:?})",
            name, summary.total_processed_samples_size, training_time, score_before, score_after
        );
        self.announce_idle(generation, Some(TrainerStatus::Completed(summary.clone())));
        Ok(summary)
    }

    /// Accuracy of the current model on `set`, if it can be measured
    fn score(&self, set: &LabeledSet) -> Option<f32> {
        if set.is_empty() {
            return None;
        }
        let classifier = self.lock_classifier().ok()?;
        match classifier.score(&set.features, &set.targets) {
            Ok(score) => Some(score),
            Err(err) => {
                warn!("[Trainer] Scoring skipped: {}", err);
                None
            }
        }
    }

    fn cancel(&self, name: &str) -> TrainingError {
        let generation = self.recover_core().settle();
        info!("[Trainer] Session '{}' cancelled", name);
        self.announce_idle(generation, None);
        TrainingError::Cancelled
    }

    /// Publish `outcome` then the Idle phase, and let other train() calls in
    ///
    /// The Idle phase is skipped if a status callback already started session
    /// `generation + 1` from this thread.
    fn announce_idle(&self, generation: u64, outcome: Option<TrainerStatus>) {
        if let Some(outcome) = outcome {
            self.status.publish(outcome);
        }
        if self.recover_core().generation == generation {
            self.publish_phase(TrainerState::Idle, None);
        }

        let mut core = self.recover_core();
        if core.settling == Some(thread::current().id()) {
            core.settling = None;
        }
        drop(core);
        self.settled.notify_all();
    }

    fn publish_phase(&self, state: TrainerState, identifier: Option<&str>) {
        self.status.publish(TrainerStatus::Phase {
            state,
            identifier: identifier.map(str::to_string),
        });
    }

    fn lock_core(&self) -> Result<MutexGuard<'_, TrainerCore>, TrainingError> {
        self.core.lock().map_err(|_| {
            let err = TrainingError::StatePoisoned;
            log_training_error(&err, "lock_core");
            err
        })
    }

    /// Lock for teardown paths that must make progress even after a panic
    fn recover_core(&self) -> MutexGuard<'_, TrainerCore> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_core<R>(&self, read: impl FnOnce(&TrainerCore) -> R) -> Result<R, TrainingError> {
        let core = self.lock_core()?;
        Ok(read(&core))
    }

    fn lock_classifier(&self) -> Result<MutexGuard<'_, Box<dyn Classifier>>, TrainingError> {
        self.classifier.lock().map_err(|_| {
            let err = TrainingError::StatePoisoned;
            log_training_error(&err, "lock_classifier");
            err
        })
    }
}

/// Handle to a running training session
pub struct TrainingSession {
    identifier: String,
    result: mpsc::Receiver<Result<SessionSummary, TrainingError>>,
}

impl TrainingSession {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Block until the session completes, fails or is cancelled
    pub fn join(self) -> Result<SessionSummary, TrainingError> {
        self.result.recv().unwrap_or_else(|_| {
            Err(TrainingError::ThreadFailed {
                details: "training session ended without a result".to_string(),
            })
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "trainer_tests.rs"]
mod tests;
