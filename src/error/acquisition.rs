// Acquisition error types

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Log an acquisition error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_acquisition_error(err: &AcquisitionError, context: &str) {
    error!(
        "Acquisition error in {}: code={}, component=Connector, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Acquisition-related errors
///
/// Connectivity variants (`ConnectFailed`, `HandshakeFailed`, `ConnectionLost`) end the
/// current streaming session; the owner decides whether to restart.
///
/// Error code range: 1001-1006
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// `start()` called on a connector that was already started
    AlreadyRunning,

    /// TCP connect to the sensor bridge failed
    ConnectFailed { address: String, reason: String },

    /// Handshake payload could not be written
    HandshakeFailed { reason: String },

    /// Read failed or the peer closed the stream while streaming
    ConnectionLost { reason: String },

    /// Mutex was poisoned
    LockPoisoned { component: String },

    /// A worker thread could not be spawned or panicked
    ThreadFailed { details: String },
}

impl AcquisitionError {
    /// Whether this error means the transport is gone
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            AcquisitionError::ConnectFailed { .. }
                | AcquisitionError::HandshakeFailed { .. }
                | AcquisitionError::ConnectionLost { .. }
        )
    }
}

impl ErrorCode for AcquisitionError {
    fn code(&self) -> i32 {
        match self {
            AcquisitionError::AlreadyRunning => 1001,
            AcquisitionError::ConnectFailed { .. } => 1002,
            AcquisitionError::HandshakeFailed { .. } => 1003,
            AcquisitionError::ConnectionLost { .. } => 1004,
            AcquisitionError::LockPoisoned { .. } => 1005,
            AcquisitionError::ThreadFailed { .. } => 1006,
        }
    }

    fn message(&self) -> String {
        match self {
            AcquisitionError::AlreadyRunning => {
                "Connector already started. Create a new connector to reconnect.".to_string()
            }
            AcquisitionError::ConnectFailed { address, reason } => {
                format!("Failed to connect to {}: {}. Is the sensor connected?", address, reason)
            }
            AcquisitionError::HandshakeFailed { reason } => {
                format!("Failed to send handshake: {}", reason)
            }
            AcquisitionError::ConnectionLost { reason } => {
                format!("Connection lost: {}", reason)
            }
            AcquisitionError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
            AcquisitionError::ThreadFailed { details } => {
                format!("Worker thread failed: {}", details)
            }
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AcquisitionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AcquisitionError {}

/// Convert from std::io::Error to AcquisitionError
impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        AcquisitionError::ConnectionLost {
            reason: err.to_string(),
        }
    }
}
