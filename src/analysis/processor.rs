// SpectralProcessor - windowing front end plus a single transform worker
//
// Ingestion (add_sample) runs on the publisher's thread: it appends to the active
// window and, at `resolution` samples, swaps the window for an empty pooled
// buffer and hands the full one to the worker. The worker runs the artifact gate
// and FFT off the ingestion path and publishes accepted feature vectors.
//
// If the worker falls behind and the pool is empty, the full window is dropped
// and counted; ingestion never blocks and never allocates.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use log::{debug, info, warn};
use rtrb::PopError;

use super::spectral::{SpectralTransform, TransformOutcome};
use super::window_pool::{IngestSide, WindowBuffer, WindowPool, WorkerSide};
use super::{FeatureVector, SliceMode};
use crate::acquisition::Sample;
use crate::channel::{BroadcastChannel, Recorder, Recording};
use crate::config::{ChannelConfig, ProcessingConfig};
use crate::error::{log_processing_error, ProcessingError, RecorderError};
use crate::shutdown::ShutdownSignal;

/// Longest the worker parks before re-checking for shutdown
const WORKER_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Window counters since the processor was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub windows_emitted: u64,
    pub artifacts_rejected: u64,
    pub windows_dropped: u64,
}

#[derive(Default)]
struct StatCounters {
    emitted: AtomicU64,
    artifacts: AtomicU64,
    dropped: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            windows_emitted: self.emitted.load(Ordering::Relaxed),
            artifacts_rejected: self.artifacts.load(Ordering::Relaxed),
            windows_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Ingestion-side state, touched only by the sample publisher
struct Ingest {
    active: WindowBuffer,
    pool: IngestSide,
    worker: Option<Thread>,
}

/// Converts a raw sample stream into feature vectors
pub struct SpectralProcessor {
    resolution: usize,
    slice_mode: SliceMode,
    transform: Arc<SpectralTransform>,
    sample_rate_hz: Arc<AtomicU32>,
    ingest: Mutex<Ingest>,
    worker_side: Mutex<Option<WorkerSide>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    features: Arc<BroadcastChannel<FeatureVector>>,
    counters: Arc<StatCounters>,
    shutdown: ShutdownSignal,
    closed: AtomicBool,
    recorder: Recorder,
}

impl SpectralProcessor {
    /// # Errors
    /// `InvalidConfig` if the configuration cannot produce feature vectors
    pub fn new(config: &ProcessingConfig, channel_config: &ChannelConfig) -> Result<Self, ProcessingError> {
        let transform = SpectralTransform::new(config)?;
        let (ingest_side, worker_side) = WindowPool::new(config.window_pool_size, config.resolution)?;

        Ok(Self {
            resolution: config.resolution,
            slice_mode: config.slice_mode,
            transform: Arc::new(transform),
            sample_rate_hz: Arc::new(AtomicU32::new(config.sample_rate_hz)),
            ingest: Mutex::new(Ingest {
                active: Vec::with_capacity(config.resolution),
                pool: ingest_side,
                worker: None,
            }),
            worker_side: Mutex::new(Some(worker_side)),
            worker: Mutex::new(None),
            features: Arc::new(BroadcastChannel::new("features", channel_config.queue_capacity)),
            counters: Arc::new(StatCounters::default()),
            shutdown: ShutdownSignal::new(),
            closed: AtomicBool::new(false),
            recorder: Recorder::new(),
        })
    }

    /// Spawn the transform worker
    ///
    /// Windows completed before `start()` wait in the pool; once it is exhausted
    /// further windows are dropped.
    pub fn start(&self) -> Result<(), ProcessingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProcessingError::AlreadyStarted);
        }
        let Some(side) = lock(&self.worker_side).take() else {
            return Err(ProcessingError::AlreadyStarted);
        };

        let worker = TransformWorker {
            side,
            transform: Arc::clone(&self.transform),
            slice_mode: self.slice_mode,
            sample_rate_hz: Arc::clone(&self.sample_rate_hz),
            features: Arc::clone(&self.features),
            counters: Arc::clone(&self.counters),
            shutdown: self.shutdown.clone(),
        };

        let handle = thread::Builder::new()
            .name("neurosky-transform".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                let err = ProcessingError::WorkerFailed {
                    details: e.to_string(),
                };
                log_processing_error(&err, "start");
                err
            })?;

        lock(&self.ingest).worker = Some(handle.thread().clone());
        *lock(&self.worker) = Some(handle);
        info!(
            "[SpectralProcessor] Started (resolution={}, mode={:?})",
            self.resolution, self.slice_mode
        );
        Ok(())
    }

    /// Append one sample to the active window
    pub fn add_sample(&self, sample: Sample) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }

        let mut ingest = lock(&self.ingest);
        ingest.active.push(sample);
        if ingest.active.len() < self.resolution {
            return;
        }

        let Ingest {
            active,
            pool,
            worker,
        } = &mut *ingest;

        match pool.free.pop() {
            Ok(empty) => {
                let full = mem::replace(active, empty);
                match pool.filled.push(full) {
                    Ok(()) => {
                        if let Some(worker) = worker {
                            worker.unpark();
                        }
                    }
                    Err(rtrb::PushError::Full(mut full)) => {
                        // Cannot happen with matched capacities; recycle as the next window
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        full.clear();
                        *active = full;
                    }
                }
            }
            Err(_) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "[SpectralProcessor] Transform worker behind, dropped window ({} total)",
                    dropped
                );
                active.clear();
            }
        }
    }

    /// Transform a whole recording at once
    ///
    /// Uses the batch slice policy. The feature vector is also published on the
    /// features channel.
    ///
    /// # Returns
    /// `None` if the recording is rejected as an artifact or too short
    pub fn add_batch(&self, samples: &[Sample]) -> Option<FeatureVector> {
        let sample_rate = self.sample_rate_hz.load(Ordering::Relaxed);
        match self.transform.transform(samples, sample_rate, SliceMode::Batch) {
            TransformOutcome::Features(features) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                self.features.publish(features.clone());
                Some(features)
            }
            TransformOutcome::Artifact { min, max } => {
                self.counters.artifacts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[SpectralProcessor] Batch rejected as artifact (min={}, max={})",
                    min, max
                );
                None
            }
            TransformOutcome::Empty => {
                debug!(
                    "[SpectralProcessor] Batch of {} samples too short for a slice",
                    samples.len()
                );
                None
            }
        }
    }

    /// Sample rate used to size batch slices
    pub fn set_sampling_rate(&self, sample_rate_hz: u32) {
        if sample_rate_hz > 0 {
            self.sample_rate_hz.store(sample_rate_hz, Ordering::Relaxed);
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sample_rate_hz.load(Ordering::Relaxed)
    }

    /// Samples in the window currently being filled
    pub fn pending_samples(&self) -> usize {
        lock(&self.ingest).active.len()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot()
    }

    pub fn features(&self) -> &Arc<BroadcastChannel<FeatureVector>> {
        &self.features
    }

    /// Capture feature vectors for `duration`
    pub fn record_features(
        &self,
        duration: Duration,
    ) -> Result<Recording<FeatureVector>, RecorderError> {
        self.recorder.record(&self.features, duration)
    }

    /// Stop the worker and close the features channel. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.trigger();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.thread().id() == thread::current().id() {
                // Called from a features callback; the worker exits after it returns
                debug!("[SpectralProcessor] Closed from the transform worker");
            } else if handle.join().is_err() {
                let err = ProcessingError::WorkerFailed {
                    details: "transform worker panicked".to_string(),
                };
                log_processing_error(&err, "close");
            }
        }

        self.features.close();
        let stats = self.stats();
        info!(
            "[SpectralProcessor] Closed (emitted={}, artifacts={}, dropped={})",
            stats.windows_emitted, stats.artifacts_rejected, stats.windows_dropped
        );
    }
}

impl Drop for SpectralProcessor {
    fn drop(&mut self) {
        self.close();
    }
}

struct TransformWorker {
    side: WorkerSide,
    transform: Arc<SpectralTransform>,
    slice_mode: SliceMode,
    sample_rate_hz: Arc<AtomicU32>,
    features: Arc<BroadcastChannel<FeatureVector>>,
    counters: Arc<StatCounters>,
    shutdown: ShutdownSignal,
}

impl TransformWorker {
    fn run(mut self) {
        debug!("[TransformWorker] Started");

        loop {
            let mut window = match self.side.filled.pop() {
                Ok(window) => window,
                Err(PopError::Empty) => {
                    // Drain what is queued before honouring shutdown
                    if self.shutdown.is_triggered() {
                        break;
                    }
                    thread::park_timeout(WORKER_IDLE_WAIT);
                    continue;
                }
            };

            self.process(&window);

            window.clear();
            if self.side.free.push(window).is_err() {
                warn!("[TransformWorker] Free queue full, discarding window buffer");
            }
        }

        debug!("[TransformWorker] Stopped");
    }

    fn process(&self, window: &[Sample]) {
        let sample_rate = self.sample_rate_hz.load(Ordering::Relaxed);
        match self.transform.transform(window, sample_rate, self.slice_mode) {
            TransformOutcome::Features(features) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                self.features.publish(features);
            }
            TransformOutcome::Artifact { min, max } => {
                self.counters.artifacts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[TransformWorker] Window rejected as artifact (min={}, max={})",
                    min, max
                );
            }
            TransformOutcome::Empty => {
                debug!("[TransformWorker] Window too short for the configured slice");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
