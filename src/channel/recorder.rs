// Recorder - time-boxed capture of everything published on a channel
//
// A recorder allows one recording at a time; starting a second one while the
// first is active is rejected with `RecorderError::AlreadyRecording`.
// Persisting the captured values is left to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{BroadcastChannel, SubscriptionHandle};
use crate::error::RecorderError;

/// Guards against overlapping recordings of the same source
#[derive(Default)]
pub struct Recorder {
    active: Arc<AtomicBool>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start capturing `channel` for `duration`
    ///
    /// Values published after the deadline are ignored even if the subscription
    /// has not been removed yet.
    pub fn record<T: Clone + Send + 'static>(
        &self,
        channel: &Arc<BroadcastChannel<T>>,
        duration: Duration,
    ) -> Result<Recording<T>, RecorderError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("[Recorder] {} already recording", channel.name());
            return Err(RecorderError::AlreadyRecording);
        }

        let deadline = Instant::now() + duration;
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);

        let handle = channel.subscribe(move |value: &T| {
            if Instant::now() <= deadline {
                if let Ok(mut values) = sink.lock() {
                    values.push(value.clone());
                }
            }
        });

        let Some(handle) = handle else {
            self.active.store(false, Ordering::SeqCst);
            return Err(RecorderError::ChannelClosed);
        };

        log::info!(
            "[Recorder] Recording {} for {:?}",
            channel.name(),
            duration
        );

        Ok(Recording {
            channel: Arc::clone(channel),
            handle: Some(handle),
            values,
            deadline,
            active: Arc::clone(&self.active),
        })
    }
}

/// An in-progress recording; dropping it stops the capture
pub struct Recording<T: Clone + Send + 'static> {
    channel: Arc<BroadcastChannel<T>>,
    handle: Option<SubscriptionHandle>,
    values: Arc<Mutex<Vec<T>>>,
    deadline: Instant,
    active: Arc<AtomicBool>,
}

impl<T: Clone + Send + 'static> Recording<T> {
    /// Block until the recording window has elapsed and return what was captured
    pub fn finish(mut self) -> Vec<T> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        self.take_values()
    }

    /// End the recording now and return what was captured so far
    pub fn stop(mut self) -> Vec<T> {
        self.take_values()
    }

    fn take_values(&mut self) -> Vec<T> {
        self.release();
        match self.values.lock() {
            Ok(mut values) => std::mem::take(&mut *values),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.channel.unsubscribe(handle);
            self.active.store(false, Ordering::SeqCst);
            log::info!("[Recorder] Recording of {} complete", self.channel.name());
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Recording<T> {
    fn drop(&mut self) {
        self.release();
    }
}
