// ThinkGear JSON wire protocol
//
// The connector sends HANDSHAKE once after connecting, then receives a byte stream
// of JSON objects separated by carriage returns. Records can be split across
// reads, so RecordFramer carries the incomplete tail into the next chunk.
//
// Decoding is a closed set of shapes tried in a fixed priority order:
// 1. raw sample      {"rawEeg": -12, ...}
// 2. nested quality  {"eSense": {"poorSignalLevel": 0, ...}, ...}
// 3. flat quality    {"poorSignalLevel": 200, ...}
// Anything else is Unrecognized (valid JSON) or Malformed (not JSON); both are
// dropped by the caller without ending the stream.

use serde::Deserialize;
use serde_json::error::Category;

use super::{Sample, SignalQuality};

/// Request raw samples in JSON framing
pub const HANDSHAKE: &[u8] = br#"{"enableRawOutput":true,"format":"Json"}"#;

/// Separator between JSON records in the inbound stream
pub const RECORD_SEPARATOR: u8 = b'\r';

/// Quality level the headset reports when it has no skin contact
pub const POOR_SIGNAL_THRESHOLD: SignalQuality = 200;

#[derive(Debug, Deserialize)]
struct ESenseBlock {
    #[serde(rename = "poorSignalLevel")]
    poor_signal_level: SignalQuality,
}

// Variant order is the decode priority
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRecord {
    Raw {
        #[serde(rename = "rawEeg")]
        raw_eeg: Sample,
    },
    ESense {
        #[serde(rename = "eSense")]
        esense: ESenseBlock,
    },
    Quality {
        #[serde(rename = "poorSignalLevel")]
        poor_signal_level: SignalQuality,
    },
}

/// Result of decoding one framed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRecord {
    Sample(Sample),
    Quality(SignalQuality),
    /// Valid JSON that matches none of the known shapes
    Unrecognized,
    /// Not valid JSON (typically a fragment)
    Malformed,
}

/// Decode one record (without its separator)
///
/// Parsed once: a shape mismatch in well-formed JSON is a data error, anything
/// else (syntax, truncation) means the bytes were not a JSON document.
pub fn decode_record(bytes: &[u8]) -> DecodedRecord {
    match serde_json::from_slice::<WireRecord>(bytes) {
        Ok(WireRecord::Raw { raw_eeg }) => DecodedRecord::Sample(raw_eeg),
        Ok(WireRecord::ESense { esense }) => DecodedRecord::Quality(esense.poor_signal_level),
        Ok(WireRecord::Quality { poor_signal_level }) => DecodedRecord::Quality(poor_signal_level),
        Err(err) if err.classify() == Category::Data => DecodedRecord::Unrecognized,
        Err(_) => DecodedRecord::Malformed,
    }
}

/// Splits a chunked byte stream into separator-delimited records
pub struct RecordFramer {
    pending: Vec<u8>,
    max_record_len: usize,
    discarded: u64,
}

impl RecordFramer {
    pub fn new(max_record_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(256),
            max_record_len: max_record_len.max(1),
            discarded: 0,
        }
    }

    /// Feed one chunk, calling `on_record` for every completed record
    ///
    /// Records are trimmed of surrounding ASCII whitespace (the stream may use
    /// `\r\n`); empty records are skipped.
    pub fn feed<F: FnMut(&[u8])>(&mut self, chunk: &[u8], mut on_record: F) {
        let mut segments = chunk.split(|&b| b == RECORD_SEPARATOR).peekable();

        while let Some(segment) = segments.next() {
            let is_last = segments.peek().is_none();
            if is_last {
                // No separator after this segment yet
                self.pending.extend_from_slice(segment);
                if self.pending.len() > self.max_record_len {
                    self.discarded += 1;
                    log::debug!(
                        "[Framer] Discarding {} byte partial record",
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                break;
            }

            if self.pending.is_empty() {
                emit_trimmed(segment, &mut on_record);
            } else {
                self.pending.extend_from_slice(segment);
                emit_trimmed(&self.pending, &mut on_record);
                self.pending.clear();
            }
        }
    }

    /// Bytes waiting for a separator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Partial records dropped for exceeding the length bound
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

fn emit_trimmed<F: FnMut(&[u8])>(record: &[u8], on_record: &mut F) {
    let trimmed = record.trim_ascii();
    if !trimmed.is_empty() {
        on_record(trimmed);
    }
}
