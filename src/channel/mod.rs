// BroadcastChannel - single-publisher, multi-subscriber fan-out with explicit teardown
//
// Two kinds of subscribers are supported:
// - Callback subscribers: invoked synchronously on the publisher's thread, in
//   registration order. Callbacks must be fast and non-blocking; anything heavier
//   should hand the value to its own queue.
// - Queue subscribers: a bounded tokio broadcast receiver per subscriber. The
//   publisher never blocks; a subscriber that falls behind loses the oldest values
//   and observes `RecvError::Lagged(n)` on its next receive.
//
// Within one channel, delivery order equals publish order. Callbacks are always
// invoked before the value is offered to queue subscribers.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub mod recorder;

pub use recorder::{Recorder, Recording};

/// Callback invoked for each published value
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle identifying one callback subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct ChannelState<T> {
    subscribers: Vec<(SubscriptionHandle, Callback<T>)>,
    queue_tx: Option<broadcast::Sender<T>>,
    next_id: u64,
    closed: bool,
}

/// Multi-subscriber, single-publisher data conduit
///
/// Shared between the publishing component and its consumers behind an `Arc`.
/// After `close()`, publishing is a no-op and new subscriptions are refused.
pub struct BroadcastChannel<T> {
    name: &'static str,
    state: Mutex<ChannelState<T>>,
}

impl<T: Clone + Send + 'static> BroadcastChannel<T> {
    /// Create a channel whose queue subscribers buffer up to `queue_capacity` values
    pub fn new(name: &'static str, queue_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(queue_capacity.max(1));
        Self {
            name,
            state: Mutex::new(ChannelState {
                subscribers: Vec::new(),
                queue_tx: Some(tx),
                next_id: 0,
                closed: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Deliver `value` to every current subscriber
    ///
    /// Callbacks run outside the subscriber lock, so a callback may subscribe or
    /// unsubscribe without deadlocking. A callback removed concurrently with a
    /// publish may still observe that one in-flight value.
    pub fn publish(&self, value: T) {
        let (callbacks, queue_tx) = {
            let state = self.lock_state();
            if state.closed {
                return;
            }
            let callbacks: Vec<Callback<T>> = state
                .subscribers
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            (callbacks, state.queue_tx.clone())
        };

        for callback in &callbacks {
            callback(&value);
        }

        if let Some(tx) = queue_tx {
            // Err only means there are no queue subscribers right now
            let _ = tx.send(value);
        }
    }

    /// Register a callback subscriber
    ///
    /// # Returns
    /// `Some(handle)` for later `unsubscribe`, or `None` if the channel is closed
    pub fn subscribe<F>(&self, callback: F) -> Option<SubscriptionHandle>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        if state.closed {
            log::debug!("[Channel:{}] subscribe refused, channel closed", self.name);
            return None;
        }
        let handle = SubscriptionHandle(state.next_id);
        state.next_id += 1;
        state.subscribers.push((handle, Arc::new(callback)));
        Some(handle)
    }

    /// Remove a callback subscriber
    ///
    /// # Returns
    /// `true` if the handle was registered
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut state = self.lock_state();
        let before = state.subscribers.len();
        state.subscribers.retain(|(h, _)| *h != handle);
        state.subscribers.len() != before
    }

    /// Register a bounded queue subscriber
    ///
    /// Returns `None` if the channel is closed. When the channel closes, the
    /// receiver drains what it has buffered and then reports `Closed`.
    pub fn subscribe_queue(&self) -> Option<broadcast::Receiver<T>> {
        let state = self.lock_state();
        state.queue_tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Register a queue subscriber wrapped as an async `Stream`
    pub fn subscribe_stream(&self) -> Option<BroadcastStream<T>> {
        self.subscribe_queue().map(BroadcastStream::new)
    }

    /// Unsubscribe everyone and turn later publishes into no-ops. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;
        state.subscribers.clear();
        // Dropping the sender lets queue subscribers observe `Closed`
        state.queue_tx = None;
        log::debug!("[Channel:{}] closed", self.name);
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Callback subscribers plus live queue subscribers
    pub fn subscriber_count(&self) -> usize {
        let state = self.lock_state();
        let queued = state
            .queue_tx
            .as_ref()
            .map(|tx| tx.receiver_count())
            .unwrap_or(0);
        state.subscribers.len() + queued
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState<T>> {
        // The state is a plain list; a panic in another holder cannot leave it torn
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
