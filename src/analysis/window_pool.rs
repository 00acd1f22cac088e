// WindowPool - fixed set of window buffers cycling through two SPSC ring buffers
//
// Buffer flow:
// 1. Ingestion pops an empty buffer from FREE when the active window is full
// 2. Ingestion pushes the full window to FILLED
// 3. The transform worker pops from FILLED, transforms, clears the buffer
// 4. The worker pushes the cleared buffer back to FREE
//
// All buffers are allocated up front, so the ingestion path never allocates. When
// FREE is empty the worker is behind and the caller drops the window instead of
// waiting.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::acquisition::Sample;
use crate::error::ProcessingError;

/// Samples of one window
pub type WindowBuffer = Vec<Sample>;

/// Ends of the ring buffers used by the ingestion path
pub struct IngestSide {
    /// Empty buffers ready to become the active window
    pub free: Consumer<WindowBuffer>,
    /// Full windows waiting for the worker
    pub filled: Producer<WindowBuffer>,
}

/// Ends of the ring buffers used by the transform worker
pub struct WorkerSide {
    pub filled: Consumer<WindowBuffer>,
    pub free: Producer<WindowBuffer>,
}

pub struct WindowPool;

impl WindowPool {
    /// Allocate `buffer_count` empty buffers with room for `window_len` samples each
    ///
    /// # Errors
    /// `InvalidConfig` if either argument is zero
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        buffer_count: usize,
        window_len: usize,
    ) -> Result<(IngestSide, WorkerSide), ProcessingError> {
        if buffer_count == 0 {
            return Err(ProcessingError::InvalidConfig {
                reason: "window_pool_size must be greater than 0".to_string(),
            });
        }
        if window_len == 0 {
            return Err(ProcessingError::InvalidConfig {
                reason: "resolution must be greater than 0".to_string(),
            });
        }

        let (mut free_tx, free_rx) = RingBuffer::new(buffer_count);
        let (filled_tx, filled_rx) = RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            if free_tx.push(Vec::with_capacity(window_len)).is_err() {
                return Err(ProcessingError::InvalidConfig {
                    reason: "window pool smaller than requested".to_string(),
                });
            }
        }

        Ok((
            IngestSide {
                free: free_rx,
                filled: filled_tx,
            },
            WorkerSide {
                filled: filled_rx,
                free: free_tx,
            },
        ))
    }
}
