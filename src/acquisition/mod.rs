// Acquisition module - sensor connection and raw sample fan-out
//
// A Connector owns one streaming session, either a TCP ThinkGear bridge or a
// synthetic generator, and publishes on four channels:
// - samples:       raw amplitude readings
// - quality:       poorSignalLevel readings (independent of samples)
// - sampling_rate: raw samples counted in the previous reporting interval
// - status:        ConnectorStatus transitions, including failures

pub mod connector;
pub mod protocol;
pub mod synthetic;

pub use connector::Connector;
pub use protocol::{decode_record, DecodedRecord, RecordFramer, POOR_SIGNAL_THRESHOLD};
pub use synthetic::SyntheticSource;

use crate::error::AcquisitionError;

/// One raw amplitude reading
pub type Sample = i32;

/// Signal quality reading: 0 is good contact, 200 means no contact
pub type SignalQuality = u32;

/// Lifecycle of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorState {
    #[default]
    Closed,
    Connecting,
    Streaming,
}

/// Events published on the connector's status channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorStatus {
    Connecting,
    Streaming,
    Closed,
    /// The session ended on a connectivity error; data channels are closed
    Failed(AcquisitionError),
}
