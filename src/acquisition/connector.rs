// Connector - one streaming session against a ThinkGear bridge or the synthetic source
//
// Threads:
// - acquisition thread: connects, sends the handshake, reads and frames records,
//   publishes samples/quality (or generates synthetic samples)
// - sampling-rate timer: spawned by the acquisition thread once streaming starts,
//   publishes and resets the raw sample counter every interval
//
// Shutdown: close() triggers the ShutdownSignal, shuts the socket down to unblock a
// pending read, then joins the acquisition thread (which joins the timer). Channels
// are closed only after both threads have exited. Called from a callback running on
// either session thread, close() skips the join and the threads exit on their own.
//
// A connector is single-use: after close() or a connection failure, build a new one.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::protocol::{decode_record, DecodedRecord, RecordFramer, HANDSHAKE, POOR_SIGNAL_THRESHOLD};
use super::synthetic::SyntheticSource;
use super::{ConnectorState, ConnectorStatus, Sample, SignalQuality};
use crate::channel::{BroadcastChannel, Recorder, Recording};
use crate::config::{AcquisitionConfig, ChannelConfig};
use crate::error::{log_acquisition_error, AcquisitionError, RecorderError};
use crate::shutdown::ShutdownSignal;

/// Socket read timeout; bounds how long a read can outlive a shutdown request
const READ_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pacing granularity of the synthetic generator
const SYNTHETIC_TICK: Duration = Duration::from_millis(5);

#[derive(Clone)]
struct ConnectorChannels {
    samples: Arc<BroadcastChannel<Sample>>,
    quality: Arc<BroadcastChannel<SignalQuality>>,
    sampling_rate: Arc<BroadcastChannel<u32>>,
    status: Arc<BroadcastChannel<ConnectorStatus>>,
}

impl ConnectorChannels {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(BroadcastChannel::new("samples", capacity)),
            quality: Arc::new(BroadcastChannel::new("quality", capacity)),
            sampling_rate: Arc::new(BroadcastChannel::new("sampling_rate", capacity)),
            status: Arc::new(BroadcastChannel::new("connector_status", capacity)),
        }
    }

    fn close_data(&self) {
        self.samples.close();
        self.quality.close();
        self.sampling_rate.close();
    }

    fn close_all(&self) {
        self.close_data();
        self.status.close();
    }
}

/// State shared between the connector handle and its acquisition thread
#[derive(Default)]
struct SessionShared {
    state: Mutex<ConnectorState>,
    socket: Mutex<Option<TcpStream>>,
    last_error: Mutex<Option<AcquisitionError>>,
    timer_thread: Mutex<Option<ThreadId>>,
}

impl SessionShared {
    fn state(&self) -> ConnectorState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectorState) {
        *lock(&self.state) = state;
    }
}

/// Sensor connection publishing raw samples and signal quality
pub struct Connector {
    config: AcquisitionConfig,
    channels: ConnectorChannels,
    shared: Arc<SessionShared>,
    shutdown: ShutdownSignal,
    reader: Mutex<Option<JoinHandle<Result<(), AcquisitionError>>>>,
    started: AtomicBool,
    closed: AtomicBool,
    recorder: Recorder,
}

impl Connector {
    pub fn new(config: AcquisitionConfig, channel_config: &ChannelConfig) -> Self {
        Self {
            config,
            channels: ConnectorChannels::new(channel_config.queue_capacity),
            shared: Arc::new(SessionShared::default()),
            shutdown: ShutdownSignal::new(),
            reader: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            recorder: Recorder::new(),
        }
    }

    /// Begin streaming on a background thread
    ///
    /// Returns once the thread is running; connection errors are reported on the
    /// status channel and by `close()`/`join()`.
    ///
    /// # Errors
    /// `AlreadyRunning` if this connector was started before
    pub fn start(&self) -> Result<(), AcquisitionError> {
        if self.started.swap(true, Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            let err = AcquisitionError::AlreadyRunning;
            log_acquisition_error(&err, "start");
            return Err(err);
        }

        self.shared.set_state(ConnectorState::Connecting);
        self.channels.status.publish(ConnectorStatus::Connecting);

        let session = ReadSession {
            config: self.config.clone(),
            channels: self.channels.clone(),
            shared: Arc::clone(&self.shared),
            shutdown: self.shutdown.clone(),
            counter: Arc::new(AtomicU32::new(0)),
            poor_signal: false,
            dropped: 0,
        };

        let handle = thread::Builder::new()
            .name("neurosky-acquisition".to_string())
            .spawn(move || session.run())
            .map_err(|e| {
                self.shared.set_state(ConnectorState::Closed);
                AcquisitionError::ThreadFailed {
                    details: e.to_string(),
                }
            })?;

        *lock(&self.reader) = Some(handle);
        info!(
            "[Connector] Started in {} mode",
            if self.config.synthetic {
                "synthetic"
            } else {
                "live"
            }
        );
        Ok(())
    }

    /// Stop streaming, join worker threads and close every channel. Idempotent.
    ///
    /// # Returns
    /// The error that ended the session if it failed before being closed, even
    /// when `join()` already reported it. Later calls return `Ok`.
    pub fn close(&self) -> Result<(), AcquisitionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.trigger();
        if let Some(socket) = lock(&self.shared.socket).take() {
            // Unblocks a read in progress; the socket may already be gone
            let _ = socket.shutdown(Shutdown::Both);
        }

        let result = self.join_reader();

        self.shared.set_state(ConnectorState::Closed);
        self.channels.status.publish(ConnectorStatus::Closed);
        self.channels.close_all();
        info!("[Connector] Closed");
        result
    }

    /// Block until the acquisition thread exits on its own
    ///
    /// Only returns early if the session fails or `close()` is called elsewhere.
    /// Returns immediately when called from a channel callback, since those run on
    /// the session threads.
    pub fn join(&self) -> Result<(), AcquisitionError> {
        self.join_reader()
    }

    fn join_reader(&self) -> Result<(), AcquisitionError> {
        let handle = {
            let mut reader = lock(&self.reader);
            if self.on_session_thread(reader.as_ref()) {
                return Ok(());
            }
            reader.take()
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                return Err(AcquisitionError::ThreadFailed {
                    details: "acquisition thread panicked".to_string(),
                });
            }
        }
        self.last_error().map_or(Ok(()), Err)
    }

    fn on_session_thread(&self, reader: Option<&JoinHandle<Result<(), AcquisitionError>>>) -> bool {
        let current = thread::current().id();
        reader.is_some_and(|handle| handle.thread().id() == current)
            || *lock(&self.shared.timer_thread) == Some(current)
    }

    pub fn state(&self) -> ConnectorState {
        self.shared.state()
    }

    /// Error that ended the most recent session, if any
    pub fn last_error(&self) -> Option<AcquisitionError> {
        lock(&self.shared.last_error).clone()
    }

    pub fn samples(&self) -> &Arc<BroadcastChannel<Sample>> {
        &self.channels.samples
    }

    pub fn quality(&self) -> &Arc<BroadcastChannel<SignalQuality>> {
        &self.channels.quality
    }

    pub fn sampling_rate(&self) -> &Arc<BroadcastChannel<u32>> {
        &self.channels.sampling_rate
    }

    pub fn status(&self) -> &Arc<BroadcastChannel<ConnectorStatus>> {
        &self.channels.status
    }

    /// Capture raw samples for `duration`
    ///
    /// # Errors
    /// `AlreadyRecording` while a previous recording is still active
    pub fn record_samples(&self, duration: Duration) -> Result<Recording<Sample>, RecorderError> {
        self.recorder.record(&self.channels.samples, duration)
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!("[Connector] Session error at drop: {}", err);
        }
    }
}

/// Everything the acquisition thread owns
struct ReadSession {
    config: AcquisitionConfig,
    channels: ConnectorChannels,
    shared: Arc<SessionShared>,
    shutdown: ShutdownSignal,
    counter: Arc<AtomicU32>,
    poor_signal: bool,
    dropped: u64,
}

impl ReadSession {
    fn run(mut self) -> Result<(), AcquisitionError> {
        let result = if self.config.synthetic {
            self.run_synthetic()
        } else {
            self.run_live()
        };

        lock(&self.shared.socket).take();
        self.shared.set_state(ConnectorState::Closed);
        if self.dropped > 0 {
            debug!("[Connector] Dropped {} unrecognized records", self.dropped);
        }

        if let Err(err) = &result {
            log_acquisition_error(err, "acquisition thread");
            *lock(&self.shared.last_error) = Some(err.clone());
            self.channels.status.publish(ConnectorStatus::Failed(err.clone()));
            self.channels.close_data();
        }
        result
    }

    fn run_live(&mut self) -> Result<(), AcquisitionError> {
        let address = self.config.address();
        let mut stream = self.connect(&address)?;

        stream
            .write_all(HANDSHAKE)
            .and_then(|_| stream.flush())
            .map_err(|e| AcquisitionError::HandshakeFailed {
                reason: e.to_string(),
            })?;
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        match stream.try_clone() {
            Ok(clone) => *lock(&self.shared.socket) = Some(clone),
            Err(e) => warn!("[Connector] Socket clone failed, close() will wait for the read timeout: {}", e),
        }
        if self.shutdown.is_triggered() {
            return Ok(());
        }

        self.enter_streaming();
        info!("[Connector] Streaming from {}", address);

        let timer = self.spawn_rate_timer()?;
        let result = self.read_loop(&mut stream);
        self.stop_rate_timer(timer);
        result
    }

    fn connect(&self, address: &str) -> Result<TcpStream, AcquisitionError> {
        let connect_failed = |reason: String| AcquisitionError::ConnectFailed {
            address: address.to_string(),
            reason,
        };

        let candidates = address
            .to_socket_addrs()
            .map_err(|e| connect_failed(e.to_string()))?;

        let mut last_reason = "address resolved to nothing".to_string();
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.config.connect_timeout()) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_reason = e.to_string(),
            }
        }
        Err(connect_failed(last_reason))
    }

    fn read_loop(&mut self, stream: &mut TcpStream) -> Result<(), AcquisitionError> {
        let mut buffer = vec![0u8; self.config.read_chunk_size.max(1)];
        let mut framer = RecordFramer::new(self.config.max_record_len);

        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }

            match stream.read(&mut buffer) {
                Ok(0) => {
                    if self.shutdown.is_triggered() {
                        return Ok(());
                    }
                    return Err(AcquisitionError::ConnectionLost {
                        reason: "peer closed the connection".to_string(),
                    });
                }
                Ok(n) => framer.feed(&buffer[..n], |record| self.dispatch(record)),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    if self.shutdown.is_triggered() {
                        return Ok(());
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn run_synthetic(&mut self) -> Result<(), AcquisitionError> {
        let mut source = SyntheticSource::new();
        let rate = u64::from(self.config.synthetic_rate_hz.max(1));

        self.enter_streaming();
        info!("[Connector] Generating synthetic samples at {} Hz", rate);

        let timer = self.spawn_rate_timer()?;
        let started = Instant::now();
        let mut emitted: u64 = 0;

        while !self.shutdown.wait_timeout(SYNTHETIC_TICK) {
            let due = (started.elapsed().as_secs_f64() * rate as f64) as u64;
            // After a stall, catch up at most one second of samples
            if due.saturating_sub(emitted) > rate {
                emitted = due - rate;
            }
            while emitted < due {
                let sample = source.next_sample();
                self.counter.fetch_add(1, Ordering::Relaxed);
                self.channels.samples.publish(sample);
                self.publish_quality(source.next_quality());
                emitted += 1;
            }
        }

        self.stop_rate_timer(timer);
        Ok(())
    }

    fn enter_streaming(&self) {
        self.shared.set_state(ConnectorState::Streaming);
        self.channels.status.publish(ConnectorStatus::Streaming);
    }

    fn dispatch(&mut self, record: &[u8]) {
        match decode_record(record) {
            DecodedRecord::Sample(sample) => {
                self.counter.fetch_add(1, Ordering::Relaxed);
                self.channels.samples.publish(sample);
            }
            DecodedRecord::Quality(level) => self.publish_quality(level),
            DecodedRecord::Unrecognized | DecodedRecord::Malformed => {
                self.dropped += 1;
                trace!("[Connector] Dropped record: {}", String::from_utf8_lossy(record));
            }
        }
    }

    fn publish_quality(&mut self, level: SignalQuality) {
        let poor = level >= POOR_SIGNAL_THRESHOLD;
        if poor && !self.poor_signal {
            warn!("[Connector] Poor connection (poorSignalLevel={})", level);
        } else if !poor && self.poor_signal {
            info!("[Connector] Sensor contact restored (poorSignalLevel={})", level);
        }
        self.poor_signal = poor;
        self.channels.quality.publish(level);
    }

    fn spawn_rate_timer(&self) -> Result<JoinHandle<()>, AcquisitionError> {
        let shutdown = self.shutdown.clone();
        let counter = Arc::clone(&self.counter);
        let channel = Arc::clone(&self.channels.sampling_rate);
        let interval = self.config.sampling_rate_interval();
        counter.store(0, Ordering::Relaxed);

        let timer = thread::Builder::new()
            .name("neurosky-sampling-rate".to_string())
            .spawn(move || {
                while !shutdown.wait_timeout(interval) {
                    let count = counter.swap(0, Ordering::Relaxed);
                    channel.publish(count);
                }
            })
            .map_err(|e| AcquisitionError::ThreadFailed {
                details: e.to_string(),
            })?;
        *lock(&self.shared.timer_thread) = Some(timer.thread().id());
        Ok(timer)
    }

    fn stop_rate_timer(&self, timer: JoinHandle<()>) {
        // The session is over either way; stop the timer with it
        self.shutdown.trigger();
        if timer.join().is_err() {
            warn!("[Connector] Sampling-rate timer panicked");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
