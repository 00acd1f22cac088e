//! Integration tests for the acquisition → processing → training pipeline
//!
//! These tests drive the public API end to end:
//! - a loopback TCP server speaking the ThinkGear JSON protocol
//! - feature extraction from the streamed samples
//! - connection loss surfacing through the status channel and `join()`
//! - labeled training on synthetic data

use std::f32::consts::PI;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use neurosky_trainer::acquisition::ConnectorStatus;
use neurosky_trainer::config::{AcquisitionConfig, AppConfig, ProcessingConfig, TrainingConfig};
use neurosky_trainer::error::AcquisitionError;
use neurosky_trainer::{ConnectorState, FeatureVector, Pipeline, Prediction};

const HANDSHAKE: &[u8] = br#"{"enableRawOutput":true,"format":"Json"}"#;

/// Accept one client, check its handshake, send `payload` in `chunk`-byte writes, then hang up
fn spawn_fake_thinkgear(payload: Vec<u8>, chunk: usize) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept client");
        let mut handshake = vec![0u8; HANDSHAKE.len()];
        socket.read_exact(&mut handshake).expect("read handshake");

        for piece in payload.chunks(chunk) {
            socket.write_all(piece).expect("write records");
            socket.flush().expect("flush records");
            thread::sleep(Duration::from_millis(1));
        }
        handshake
    });

    (addr, handle)
}

fn sinusoid(len: usize, freq_hz: f32, fs: f32, amplitude: f32) -> Vec<i32> {
    (0..len)
        .map(|i| (amplitude * (2.0 * PI * freq_hz * i as f32 / fs).sin()).round() as i32)
        .collect()
}

fn live_config(addr: SocketAddr) -> AppConfig {
    AppConfig {
        acquisition: AcquisitionConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            synthetic: false,
            connect_timeout_ms: 1000,
            ..AcquisitionConfig::default()
        },
        ..AppConfig::default()
    }
}

#[test]
fn test_thinkgear_stream_produces_features() {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"{\"eSense\":{\"attention\":40,\"poorSignalLevel\":0}}\r");
    payload.extend_from_slice(b"{\"blinkStrength\":55}\r");
    for sample in sinusoid(500, 20.0, 512.0, 100.0) {
        payload.extend_from_slice(format!("{{\"rawEeg\":{}}}\r", sample).as_bytes());
    }
    payload.extend_from_slice(b"{\"poorSignalLevel\":200}\r\n");

    // Odd chunk size splits records across writes
    let (addr, server) = spawn_fake_thinkgear(payload, 333);
    let pipeline = Pipeline::new(live_config(addr)).unwrap();

    let (feature_tx, feature_rx) = mpsc::channel();
    pipeline
        .processor()
        .features()
        .subscribe(move |f: &FeatureVector| {
            let _ = feature_tx.send(f.clone());
        });
    let (quality_tx, quality_rx) = mpsc::channel();
    pipeline.connector().quality().subscribe(move |q: &u32| {
        let _ = quality_tx.send(*q);
    });
    let (status_tx, status_rx) = mpsc::channel();
    pipeline
        .connector()
        .status()
        .subscribe(move |s: &ConnectorStatus| {
            let _ = status_tx.send(s.clone());
        });

    pipeline.start().unwrap();
    assert_eq!(server.join().unwrap(), HANDSHAKE);

    // The server hung up, so the session ends with a connection loss
    assert!(matches!(
        pipeline.join(),
        Err(AcquisitionError::ConnectionLost { .. })
    ));
    // close() still reports the failure that join() already returned
    assert!(matches!(
        pipeline.close(),
        Err(AcquisitionError::ConnectionLost { .. })
    ));
    assert!(pipeline.close().is_ok());
    assert_eq!(pipeline.connector().state(), ConnectorState::Closed);

    let features: Vec<FeatureVector> = feature_rx.try_iter().collect();
    assert_eq!(features.len(), 2);
    for vector in &features {
        assert_eq!(vector.len(), 48);
        // 20 Hz at 2.048 Hz/bin peaks near bin 10, i.e. feature 8 after low_cut
        let peak = vector
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((7..=9).contains(&peak), "peak at feature {}", peak);
    }

    let qualities: Vec<u32> = quality_rx.try_iter().collect();
    assert_eq!(qualities, vec![0, 200]);

    let statuses: Vec<ConnectorStatus> = status_rx.try_iter().collect();
    assert!(statuses.contains(&ConnectorStatus::Streaming));
    assert!(statuses
        .iter()
        .any(|s| matches!(s, ConnectorStatus::Failed(AcquisitionError::ConnectionLost { .. }))));
}

#[test]
fn test_artifact_windows_never_reach_trainer() {
    // First window carries a blink, second is clean
    let mut samples = sinusoid(250, 10.0, 512.0, 50.0);
    samples[100] = 400;
    samples.extend(sinusoid(250, 10.0, 512.0, 50.0));

    let mut payload = Vec::new();
    for sample in samples {
        payload.extend_from_slice(format!("{{\"rawEeg\":{}}}\r", sample).as_bytes());
    }

    let (addr, server) = spawn_fake_thinkgear(payload, 1000);
    let pipeline = Pipeline::new(live_config(addr)).unwrap();
    let (tx, rx) = mpsc::channel();
    pipeline
        .processor()
        .features()
        .subscribe(move |f: &FeatureVector| {
            let _ = tx.send(f.len());
        });

    pipeline.start().unwrap();
    server.join().unwrap();
    let _ = pipeline.join();
    assert!(pipeline.close().is_err());

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![48]);
    let stats = pipeline.processor().stats();
    assert_eq!(stats.artifacts_rejected, 1);
    assert_eq!(stats.windows_emitted, 1);
}

#[test]
fn test_unreachable_bridge_reports_connect_failure() {
    // Bind then drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let pipeline = Pipeline::new(live_config(addr)).unwrap();

    pipeline.start().unwrap();
    assert!(matches!(
        pipeline.join(),
        Err(AcquisitionError::ConnectFailed { .. })
    ));
    assert!(matches!(
        pipeline.connector().last_error(),
        Some(AcquisitionError::ConnectFailed { .. })
    ));
    assert!(matches!(
        pipeline.close(),
        Err(AcquisitionError::ConnectFailed { .. })
    ));
}

#[test]
fn test_synthetic_training_session() {
    let config = AppConfig {
        acquisition: AcquisitionConfig {
            synthetic: true,
            ..AcquisitionConfig::default()
        },
        processing: ProcessingConfig {
            resolution: 64,
            live_high_cut: 20,
            ..ProcessingConfig::default()
        },
        training: TrainingConfig {
            training_wait_ms: 50,
            recording_ms: 500,
            knn_neighbors: 3,
        },
        ..AppConfig::default()
    };
    let pipeline = Pipeline::new(config).unwrap();
    let trainer = Arc::clone(pipeline.trainer());
    assert_eq!(trainer.register("focus").unwrap(), 0);
    assert_eq!(trainer.register("relax").unwrap(), 1);

    pipeline.start().unwrap();
    let focus = trainer.train("focus").unwrap().join().unwrap();
    let relax = trainer.train("relax").unwrap().join().unwrap();

    assert_eq!(focus.session_label, "focus_0");
    assert!(focus.samples_size_scored_against > 0);
    assert!(relax.score_before.is_some());
    assert_eq!(
        relax.total_processed_samples_size,
        focus.samples_size_scored_against + relax.samples_size_scored_against
    );
    assert_eq!(trainer.dataset_len(), relax.total_processed_samples_size);

    let (tx, rx) = mpsc::channel();
    trainer.predictions().subscribe(move |p: &Prediction| {
        let _ = tx.send(p.identifier.clone());
    });
    let predicted = rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert!(predicted == "focus" || predicted == "relax");

    pipeline.close().unwrap();
}
