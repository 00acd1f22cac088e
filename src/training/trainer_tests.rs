use super::*;
use std::time::Duration;

use crate::error::ClassifierError;

fn fast_config(recording_ms: u64) -> TrainingConfig {
    TrainingConfig {
        training_wait_ms: 0,
        recording_ms,
        knn_neighbors: 3,
    }
}

fn trainer(recording_ms: u64) -> Trainer {
    Trainer::new(fast_config(recording_ms), &ChannelConfig::default())
}

fn wait_for_state(trainer: &Trainer, state: TrainerState) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if trainer.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn up_vector(i: usize) -> FeatureVector {
    vec![10.0 + i as f32 * 0.01, 0.0, 1.0]
}

fn down_vector(i: usize) -> FeatureVector {
    vec![0.0, 10.0 + i as f32 * 0.01, 1.0]
}

fn collect_status(trainer: &Trainer) -> mpsc::Receiver<TrainerStatus> {
    let (tx, rx) = mpsc::channel();
    trainer.status().subscribe(move |status: &TrainerStatus| {
        let _ = tx.send(status.clone());
    });
    rx
}

/// Record `vectors` under `name` and wait for the session to finish
fn run_session(trainer: &Trainer, name: &str, vectors: Vec<FeatureVector>) -> SessionSummary {
    let session = trainer.train(name).unwrap();
    assert!(wait_for_state(trainer, TrainerState::Recording));
    for features in vectors {
        trainer.add_feature_vector(features);
    }
    session.join().unwrap()
}

/// Delegates to KNN but takes a while to fit
struct SlowClassifier {
    inner: KnnClassifier,
    delay: Duration,
}

impl Classifier for SlowClassifier {
    fn name(&self) -> &str {
        "SlowKNN"
    }

    fn fit(&mut self, features: &[FeatureVector], targets: &[usize]) -> Result<(), ClassifierError> {
        thread::sleep(self.delay);
        self.inner.fit(features, targets)
    }

    fn predict(&self, features: &[f32]) -> Result<usize, ClassifierError> {
        self.inner.predict(features)
    }
}

#[test]
fn test_register_assigns_dense_targets() {
    let trainer = trainer(100);
    assert_eq!(trainer.register("up").unwrap(), 0);
    assert_eq!(trainer.register("down").unwrap(), 1);
    assert_eq!(trainer.register("up").unwrap(), 0);

    assert_eq!(trainer.target("down"), Some(1));
    assert_eq!(trainer.session_count("up"), Some(0));
    assert_eq!(trainer.session_label("up"), Some("up_0".to_string()));
    assert_eq!(trainer.identifiers().len(), 2);
}

#[test]
fn test_two_label_scenario() {
    let trainer = trainer(300);
    trainer.register("up").unwrap();
    trainer.register("down").unwrap();

    let first = run_session(&trainer, "up", (0..10).map(up_vector).collect());
    assert_eq!(first.identifier_name, "up");
    assert_eq!(first.session_label, "up_0");
    assert_eq!(first.classifier_name, "KNN");
    assert_eq!(first.score_before, None);
    assert_eq!(first.score_after, Some(1.0));
    assert_eq!(first.samples_size_scored_against, 10);
    assert_eq!(first.total_processed_samples_size, 10);
    assert!(trainer.is_trained());

    let second = run_session(&trainer, "down", (0..10).map(down_vector).collect());
    assert_eq!(second.session_label, "down_0");
    // Model only knew "up" when this session was scored
    assert_eq!(second.score_before, Some(0.0));
    assert_eq!(second.score_after, Some(1.0));
    assert_eq!(second.total_processed_samples_size, 20);

    assert_eq!(trainer.dataset_len(), 20);
    assert_eq!(trainer.session_count("up"), Some(1));
    assert_eq!(trainer.session_count("down"), Some(1));
    assert_eq!(trainer.session_label("up"), Some("up_1".to_string()));
    assert_eq!(trainer.summaries().len(), 2);
    assert_eq!(trainer.state(), TrainerState::Idle);

    assert_eq!(trainer.predict(&up_vector(3)).unwrap(), "up");
    assert_eq!(trainer.predict(&down_vector(7)).unwrap(), "down");
}

#[test]
fn test_first_session_phases() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    let rx = collect_status(&trainer);

    run_session(&trainer, "up", (0..4).map(up_vector).collect());

    let statuses: Vec<TrainerStatus> = rx.try_iter().collect();
    let phases: Vec<TrainerState> = statuses
        .iter()
        .filter_map(|s| match s {
            TrainerStatus::Phase { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            TrainerState::Waiting,
            TrainerState::Recording,
            TrainerState::Fitting,
            TrainerState::Idle
        ]
    );
    assert!(statuses
        .iter()
        .any(|s| matches!(s, TrainerStatus::Completed(summary) if summary.identifier_name == "up")));
}

#[test]
fn test_second_session_publishes_score() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    run_session(&trainer, "up", (0..4).map(up_vector).collect());

    let rx = collect_status(&trainer);
    run_session(&trainer, "up", (4..8).map(up_vector).collect());

    let scored = rx.try_iter().find_map(|s| match s {
        TrainerStatus::Scored { identifier, score } => Some((identifier, score)),
        _ => None,
    });
    assert_eq!(scored, Some(("up".to_string(), 1.0)));
}

#[test]
fn test_train_while_recording_is_rejected() {
    let trainer = trainer(300);
    trainer.register("up").unwrap();
    trainer.register("down").unwrap();
    let rx = collect_status(&trainer);

    let session = trainer.train("up").unwrap();
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    for i in 0..5 {
        trainer.add_feature_vector(up_vector(i));
    }

    assert!(matches!(trainer.train("down"), Err(TrainingError::AlreadyTraining)));
    assert_eq!(trainer.state(), TrainerState::Recording);

    for i in 5..10 {
        trainer.add_feature_vector(up_vector(i));
    }
    let summary = session.join().unwrap();

    assert_eq!(summary.identifier_name, "up");
    assert_eq!(summary.total_processed_samples_size, 10);
    assert_eq!(trainer.session_count("down"), Some(0));
    // Everything recorded went to "up"
    assert_eq!(trainer.predict(&down_vector(0)).unwrap(), "up");
    assert!(rx
        .try_iter()
        .any(|s| s == TrainerStatus::Rejected(TrainingError::AlreadyTraining)));
}

#[test]
fn test_predict_before_training() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    assert!(matches!(trainer.predict(&up_vector(0)), Err(TrainingError::NotTrained)));
}

#[test]
fn test_unknown_identifier() {
    let trainer = trainer(100);
    assert!(matches!(
        trainer.train("left"),
        Err(TrainingError::UnknownIdentifier { name }) if name == "left"
    ));
    assert_eq!(trainer.state(), TrainerState::Idle);
}

#[test]
fn test_fit_failure_returns_to_idle() {
    let trainer = trainer(50);
    trainer.register("up").unwrap();
    let rx = collect_status(&trainer);

    // Nothing recorded, so the classifier has nothing to fit on
    let session = trainer.train("up").unwrap();
    let result = session.join();

    assert!(matches!(
        result,
        Err(TrainingError::FitFailed {
            source: ClassifierError::EmptyDataset
        })
    ));
    assert_eq!(trainer.state(), TrainerState::Idle);
    assert_eq!(trainer.session_count("up"), Some(0));
    assert!(!trainer.is_trained());
    assert!(trainer.summaries().is_empty());
    assert!(rx.try_iter().any(|s| matches!(s, TrainerStatus::Failed(_))));
}

#[test]
fn test_predict_busy_while_fitting() {
    let classifier = SlowClassifier {
        inner: KnnClassifier::default(),
        delay: Duration::from_millis(400),
    };
    let trainer = Trainer::with_classifier(
        fast_config(100),
        &ChannelConfig::default(),
        Box::new(classifier),
    );
    assert_eq!(trainer.classifier_name(), "SlowKNN");
    trainer.register("up").unwrap();

    let session = trainer.train("up").unwrap();
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    trainer.add_feature_vector(up_vector(0));

    assert!(wait_for_state(&trainer, TrainerState::Fitting));
    assert!(matches!(trainer.predict(&up_vector(0)), Err(TrainingError::Busy)));

    session.join().unwrap();
    assert_eq!(trainer.predict(&up_vector(0)).unwrap(), "up");
}

#[test]
fn test_feature_vectors_are_classified_when_idle() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    trainer.register("down").unwrap();
    run_session(&trainer, "up", (0..5).map(up_vector).collect());
    run_session(&trainer, "down", (0..5).map(down_vector).collect());

    let (tx, rx) = mpsc::channel();
    trainer.predictions().subscribe(move |p: &Prediction| {
        let _ = tx.send(p.clone());
    });

    trainer.add_feature_vector(down_vector(2));
    let prediction = rx.try_recv().unwrap();
    assert_eq!(prediction.identifier, "down");
    assert_eq!(prediction.target, 1);
    // Classified vectors are not stored
    assert_eq!(trainer.dataset_len(), 10);
}

#[test]
fn test_close_cancels_waiting_session() {
    let config = TrainingConfig {
        training_wait_ms: 10_000,
        recording_ms: 10_000,
        knn_neighbors: 3,
    };
    let trainer = Trainer::new(config, &ChannelConfig::default());
    trainer.register("up").unwrap();

    let session = trainer.train("up").unwrap();
    assert_eq!(session.identifier(), "up");
    assert_eq!(trainer.state(), TrainerState::Waiting);

    let started = Instant::now();
    trainer.close();
    assert!(matches!(session.join(), Err(TrainingError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(trainer.state(), TrainerState::Idle);
    assert!(trainer.status().is_closed());
    assert!(trainer.predictions().is_closed());
}

#[test]
fn test_close_during_recording_keeps_examples() {
    let trainer = trainer(10_000);
    trainer.register("up").unwrap();

    let session = trainer.train("up").unwrap();
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    for i in 0..3 {
        trainer.add_feature_vector(up_vector(i));
    }

    trainer.close();
    assert!(matches!(session.join(), Err(TrainingError::Cancelled)));
    assert_eq!(trainer.dataset_len(), 3);
    assert_eq!(trainer.session_count("up"), Some(0));
}

#[test]
fn test_operations_after_close() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    trainer.close();
    trainer.close();

    assert!(matches!(trainer.train("up"), Err(TrainingError::Closed)));
    assert!(matches!(trainer.predict(&up_vector(0)), Err(TrainingError::Closed)));
}

#[test]
fn test_clear_data() {
    let trainer = trainer(100);
    trainer.register("up").unwrap();
    run_session(&trainer, "up", (0..5).map(up_vector).collect());
    assert_eq!(trainer.dataset_len(), 5);

    trainer.clear_data().unwrap();
    assert_eq!(trainer.dataset_len(), 0);
    // The fitted model survives
    assert_eq!(trainer.predict(&up_vector(0)).unwrap(), "up");
}

#[test]
fn test_clear_data_rejected_during_session() {
    let trainer = trainer(300);
    trainer.register("up").unwrap();

    let session = trainer.train("up").unwrap();
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    trainer.add_feature_vector(up_vector(0));

    assert!(matches!(trainer.clear_data(), Err(TrainingError::AlreadyTraining)));
    session.join().unwrap();
    assert_eq!(trainer.dataset_len(), 1);
}

fn phases(statuses: &[TrainerStatus]) -> Vec<(TrainerState, Option<String>)> {
    statuses
        .iter()
        .filter_map(|s| match s {
            TrainerStatus::Phase { state, identifier } => Some((*state, identifier.clone())),
            _ => None,
        })
        .collect()
}

fn phase(state: TrainerState, identifier: Option<&str>) -> (TrainerState, Option<String>) {
    (state, identifier.map(str::to_string))
}

#[test]
fn test_train_from_completed_callback() {
    let trainer = Arc::new(trainer(100));
    trainer.register("up").unwrap();
    trainer.register("down").unwrap();
    let rx = collect_status(&trainer);

    // Start the next label as soon as the first one completes
    let (chained_tx, chained_rx) = mpsc::channel();
    let handle = Arc::downgrade(&trainer);
    trainer.status().subscribe(move |status: &TrainerStatus| {
        if let TrainerStatus::Completed(summary) = status {
            if summary.identifier_name == "up" {
                if let Some(trainer) = handle.upgrade() {
                    let _ = chained_tx.send(trainer.train("down"));
                }
            }
        }
    });

    let first = run_session(&trainer, "up", (0..4).map(up_vector).collect());
    assert_eq!(first.identifier_name, "up");

    let chained = chained_rx
        .recv_timeout(Duration::from_secs(3))
        .unwrap()
        .unwrap();
    assert_eq!(chained.identifier(), "down");
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    for i in 0..4 {
        trainer.add_feature_vector(down_vector(i));
    }
    let second = chained.join().unwrap();

    assert_eq!(second.total_processed_samples_size, 8);
    assert_eq!(trainer.session_count("up"), Some(1));
    assert_eq!(trainer.session_count("down"), Some(1));
    assert_eq!(trainer.state(), TrainerState::Idle);

    // The trainer never went idle in between, so no Idle phase separates the sessions
    let statuses: Vec<TrainerStatus> = rx.try_iter().collect();
    assert_eq!(
        phases(&statuses),
        vec![
            phase(TrainerState::Waiting, Some("up")),
            phase(TrainerState::Recording, Some("up")),
            phase(TrainerState::Fitting, Some("up")),
            phase(TrainerState::Waiting, Some("down")),
            phase(TrainerState::Recording, Some("down")),
            phase(TrainerState::Scoring, Some("down")),
            phase(TrainerState::Fitting, Some("down")),
            phase(TrainerState::Idle, None),
        ]
    );
}

#[test]
fn test_next_session_waiting_follows_idle() {
    let trainer = Arc::new(trainer(50));
    trainer.register("up").unwrap();
    trainer.register("down").unwrap();
    let rx = collect_status(&trainer);

    // Hold the session thread between Completed and the Idle phase
    let (completed_tx, completed_rx) = mpsc::channel();
    trainer.status().subscribe(move |status: &TrainerStatus| {
        if matches!(status, TrainerStatus::Completed(_)) {
            let _ = completed_tx.send(());
            thread::sleep(Duration::from_millis(100));
        }
    });

    let first = trainer.train("up").unwrap();
    assert!(wait_for_state(&trainer, TrainerState::Recording));
    for i in 0..4 {
        trainer.add_feature_vector(up_vector(i));
    }
    completed_rx.recv_timeout(Duration::from_secs(3)).unwrap();

    // Issued while "up" is still announcing Idle
    let second = trainer.train("down").unwrap();
    first.join().unwrap();
    second.join().unwrap();

    let statuses: Vec<TrainerStatus> = rx.try_iter().collect();
    assert_eq!(
        phases(&statuses),
        vec![
            phase(TrainerState::Waiting, Some("up")),
            phase(TrainerState::Recording, Some("up")),
            phase(TrainerState::Fitting, Some("up")),
            phase(TrainerState::Idle, None),
            phase(TrainerState::Waiting, Some("down")),
            phase(TrainerState::Recording, Some("down")),
            phase(TrainerState::Scoring, Some("down")),
            phase(TrainerState::Fitting, Some("down")),
            phase(TrainerState::Idle, None),
        ]
    );
}

#[test]
fn test_close_from_status_callback() {
    let trainer = Arc::new(trainer(50));
    trainer.register("up").unwrap();
    let handle = Arc::downgrade(&trainer);
    trainer.status().subscribe(move |status: &TrainerStatus| {
        if matches!(status, TrainerStatus::Completed(_)) {
            if let Some(trainer) = handle.upgrade() {
                trainer.close();
            }
        }
    });

    let summary = run_session(&trainer, "up", (0..4).map(up_vector).collect());
    assert_eq!(summary.samples_size_scored_against, 4);
    assert!(trainer.status().is_closed());
    assert!(matches!(trainer.train("up"), Err(TrainingError::Closed)));
}
