// ShutdownSignal - cancellation token shared by long-running loops
//
// Every worker loop checks `is_triggered()` at its iteration boundary, and every
// timed wait goes through `wait_timeout()` so that `trigger()` wakes sleepers
// immediately instead of letting them finish their interval.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable cancellation token with an interruptible timed wait
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter. Idempotent.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *triggered = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep for `timeout` unless shutdown is requested first
    ///
    /// # Returns
    /// `true` if shutdown was requested (before or during the wait),
    /// `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut triggered = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Loop guards against spurious wakeups
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = match cvar.wait_timeout(triggered, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}
