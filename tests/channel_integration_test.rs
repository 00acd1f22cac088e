//! Integration tests for broadcast channels shared across threads
//!
//! - ordering for callback and queue subscribers fed by another thread
//! - teardown while subscribers are attached
//! - recording a live connector channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use futures::StreamExt;
use neurosky_trainer::channel::Recorder;
use neurosky_trainer::config::{AcquisitionConfig, ChannelConfig};
use neurosky_trainer::error::RecorderError;
use neurosky_trainer::{BroadcastChannel, Connector};

#[test]
fn test_cross_thread_publish_preserves_order() {
    let channel = Arc::new(BroadcastChannel::<u32>::new("counter", 2000));
    let (tx, rx) = mpsc::channel();
    channel.subscribe(move |v: &u32| {
        let _ = tx.send(*v);
    });
    let mut queue = channel.subscribe_queue().unwrap();

    let publisher = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            for v in 0..1000 {
                channel.publish(v);
            }
            channel.close();
        })
    };
    publisher.join().unwrap();

    let delivered: Vec<u32> = rx.try_iter().collect();
    assert_eq!(delivered, (0..1000).collect::<Vec<_>>());

    let mut queued = Vec::new();
    while let Ok(v) = queue.try_recv() {
        queued.push(v);
    }
    assert_eq!(queued, (0..1000).collect::<Vec<_>>());
}

#[test]
fn test_close_while_subscribed_from_other_threads() {
    let channel = Arc::new(BroadcastChannel::<u32>::new("busy", 16));
    let seen = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let seen = Arc::clone(&seen);
        channel.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    }

    let publisher = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            for v in 0..10_000 {
                channel.publish(v);
            }
        })
    };
    thread::sleep(Duration::from_millis(1));
    channel.close();
    channel.close();
    publisher.join().unwrap();

    let after_close = seen.load(Ordering::SeqCst);
    channel.publish(1);
    assert_eq!(seen.load(Ordering::SeqCst), after_close);
    assert_eq!(channel.subscriber_count(), 0);
    assert!(channel.subscribe(|_| {}).is_none());
}

#[tokio::test]
async fn test_stream_subscriber_ends_with_channel() {
    let channel = Arc::new(BroadcastChannel::<String>::new("labels", 8));
    let stream = channel.subscribe_stream().unwrap();

    let publisher = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            for label in ["up", "down", "up"] {
                channel.publish(label.to_string());
            }
            channel.close();
        })
    };
    publisher.join().unwrap();

    let values: Vec<String> = stream.filter_map(|r| async move { r.ok() }).collect().await;
    assert_eq!(values, vec!["up", "down", "up"]);
}

#[test]
fn test_record_synthetic_samples() {
    let config = AcquisitionConfig {
        synthetic: true,
        ..AcquisitionConfig::default()
    };
    let connector = Connector::new(config, &ChannelConfig::default());
    connector.start().unwrap();

    let recording = connector
        .record_samples(Duration::from_millis(200))
        .unwrap();
    assert!(matches!(
        connector.record_samples(Duration::from_millis(200)),
        Err(RecorderError::AlreadyRecording)
    ));
    let samples = recording.finish();
    connector.close().unwrap();

    // 512 Hz for 200 ms, with generous slack for scheduling
    assert!(samples.len() > 30, "only {} samples recorded", samples.len());
    assert!(samples.iter().all(|s| (-150..150).contains(s)));

    // The recorder is free again once the previous recording finished
    let standalone = Arc::new(BroadcastChannel::<i32>::new("standalone", 8));
    let recorder = Recorder::new();
    let recording = recorder.record(&standalone, Duration::from_secs(5)).unwrap();
    standalone.publish(7);
    assert_eq!(recording.stop(), vec![7]);
    assert!(!recorder.is_recording());
}
