//! Telemetry line decoding.
//!
//! The firmware sends one record per line:
//!
//! ```text
//! [CAMARADAS DO EDU]: ax, ay, az, gx, gy, gz
//! ```
//!
//! Lines without the header are chatter from the firmware's debug console and
//! are dropped silently. Lines with the header but a bad payload are reported
//! and skipped; they never end the stream.

use crate::collector::types::{Sample, WIRE_FIELD_COUNT, WIRE_HEADER};
use chrono::Utc;
use std::fmt;

/// Outcome of decoding a single line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Sample(Sample),
    /// The line does not carry the telemetry header.
    Ignored,
    Error(DecodeError),
}

/// Why a header-tagged line could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeReason {
    /// The payload did not split into exactly six fields.
    FieldCount { expected: usize, found: usize },
    /// A field is not a decimal number.
    InvalidNumber { index: usize, field: String },
    /// A field parsed to NaN or infinity.
    NonFinite { index: usize, field: String },
}

/// A malformed telemetry line and the reason it was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub reason: DecodeReason,
    pub raw_line: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DecodeReason::FieldCount { expected, found } => {
                write!(f, "Expected {expected} values, got {found}")?
            }
            DecodeReason::InvalidNumber { index, field } => {
                write!(f, "Invalid number {field:?} in field {index}")?
            }
            DecodeReason::NonFinite { index, field } => {
                write!(f, "Non-finite value {field:?} in field {index}")?
            }
        }
        write!(f, ": {}", self.raw_line)
    }
}

impl std::error::Error for DecodeError {}

/// Turns complete text lines into samples stamped with the receipt time.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    header: String,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(WIRE_HEADER)
    }
}

impl FrameDecoder {
    /// Create a decoder for lines tagged with `header`.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Decode a line, stamping it with the current wall-clock time.
    pub fn decode(&self, line: &str) -> DecodeOutcome {
        self.decode_at(line, now_secs())
    }

    /// Decode a line as if it had been received at `timestamp` seconds.
    pub fn decode_at(&self, line: &str, timestamp: f64) -> DecodeOutcome {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(self.header.as_str()) else {
            return DecodeOutcome::Ignored;
        };

        let fields: Vec<&str> = payload.split(',').map(str::trim).collect();
        if fields.len() != WIRE_FIELD_COUNT {
            return DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::FieldCount {
                    expected: WIRE_FIELD_COUNT,
                    found: fields.len(),
                },
                raw_line: line.to_string(),
            });
        }

        let mut values = [0.0f64; WIRE_FIELD_COUNT];
        for (index, field) in fields.iter().enumerate() {
            match parse_field(index, field) {
                Ok(value) => values[index] = value,
                Err(reason) => {
                    return DecodeOutcome::Error(DecodeError {
                        reason,
                        raw_line: line.to_string(),
                    })
                }
            }
        }

        DecodeOutcome::Sample(Sample::new(
            timestamp,
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        ))
    }
}

fn parse_field(index: usize, field: &str) -> Result<f64, DecodeReason> {
    let value: f64 = field.parse().map_err(|_| DecodeReason::InvalidNumber {
        index,
        field: field.to_string(),
    })?;
    if !value.is_finite() {
        return Err(DecodeReason::NonFinite {
            index,
            field: field.to_string(),
        });
    }
    Ok(value)
}

/// Format a sample the way the firmware's telemetry task does.
///
/// The receipt timestamp is not part of the wire format.
pub fn encode_line(sample: &Sample) -> String {
    format!(
        "{} {}, {}, {}, {}, {}, {}",
        WIRE_HEADER, sample.ax, sample.ay, sample.az, sample.gx, sample.gy, sample.gz
    )
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> DecodeOutcome {
        FrameDecoder::default().decode_at(line, 10.0)
    }

    #[test]
    fn test_decodes_firmware_line() {
        let outcome = decode("[CAMARADAS DO EDU]: -8123, 15, 16384, -3, 0, 9000");
        let DecodeOutcome::Sample(sample) = outcome else {
            panic!("expected sample, got {outcome:?}");
        };
        assert_eq!(sample.timestamp, 10.0);
        assert_eq!(sample.accel(), [-8123.0, 15.0, 16384.0]);
        assert_eq!(sample.gyro(), [-3.0, 0.0, 9000.0]);
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        let outcome = decode("  [CAMARADAS DO EDU]:1.5 ,-2.25,  +3,4e1 , .5,-0.0  \r");
        let DecodeOutcome::Sample(sample) = outcome else {
            panic!("expected sample, got {outcome:?}");
        };
        assert_eq!(sample.accel(), [1.5, -2.25, 3.0]);
        assert_eq!(sample.gyro(), [40.0, 0.5, -0.0]);
    }

    #[test]
    fn test_lines_without_header_are_ignored() {
        assert_eq!(decode(""), DecodeOutcome::Ignored);
        assert_eq!(decode("   "), DecodeOutcome::Ignored);
        assert_eq!(decode("TX[12]: hello"), DecodeOutcome::Ignored);
        assert_eq!(decode("ax,ay,az,gx,gy,gz,temp"), DecodeOutcome::Ignored);
        assert_eq!(decode("1, 2, 3, 4, 5, 6"), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_wrong_field_count_is_an_error() {
        match decode("[CAMARADAS DO EDU]: 1, 2, 3, 4, 5") {
            DecodeOutcome::Error(e) => {
                assert_eq!(
                    e.reason,
                    DecodeReason::FieldCount {
                        expected: 6,
                        found: 5
                    }
                );
                assert_eq!(e.raw_line, "[CAMARADAS DO EDU]: 1, 2, 3, 4, 5");
            }
            other => panic!("expected error, got {other:?}"),
        }

        assert!(matches!(
            decode("[CAMARADAS DO EDU]: 1, 2, 3, 4, 5, 6, 7"),
            DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::FieldCount { found: 7, .. },
                ..
            })
        ));
        assert!(matches!(
            decode("[CAMARADAS DO EDU]:"),
            DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::FieldCount { found: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_non_numeric_field_is_an_error() {
        match decode("[CAMARADAS DO EDU]: 1, 2, x3, 4, 5, 6") {
            DecodeOutcome::Error(e) => {
                assert_eq!(
                    e.reason,
                    DecodeReason::InvalidNumber {
                        index: 2,
                        field: "x3".to_string()
                    }
                );
            }
            other => panic!("expected error, got {other:?}"),
        }

        assert!(matches!(
            decode("[CAMARADAS DO EDU]: 1, , 3, 4, 5, 6"),
            DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::InvalidNumber { index: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert!(matches!(
            decode("[CAMARADAS DO EDU]: NaN, 2, 3, 4, 5, 6"),
            DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::NonFinite { index: 0, .. },
                ..
            })
        ));
        assert!(matches!(
            decode("[CAMARADAS DO EDU]: 1, 2, 3, 4, 5, inf"),
            DecodeOutcome::Error(DecodeError {
                reason: DecodeReason::NonFinite { index: 5, .. },
                ..
            })
        ));
    }

    #[test]
    fn test_encoded_sample_decodes_to_same_values() {
        let original = Sample::new(0.0, [-8000.0, 1234.5, 16384.0], [-0.125, 3.0, 8001.0]);
        let line = encode_line(&original);
        assert!(line.starts_with(WIRE_HEADER));

        let DecodeOutcome::Sample(decoded) = FrameDecoder::default().decode_at(&line, 0.0) else {
            panic!("encoded line did not decode: {line}");
        };
        for (a, b) in decoded.accel().iter().zip(original.accel().iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        for (a, b) in decoded.gyro().iter().zip(original.gyro().iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_custom_header() {
        let decoder = FrameDecoder::new("IMU>");
        assert!(matches!(
            decoder.decode_at("IMU> 1,2,3,4,5,6", 0.0),
            DecodeOutcome::Sample(_)
        ));
        assert_eq!(
            decoder.decode_at("[CAMARADAS DO EDU]: 1,2,3,4,5,6", 0.0),
            DecodeOutcome::Ignored
        );
    }

    #[test]
    fn test_decode_stamps_wall_clock() {
        let before = now_secs();
        let outcome = FrameDecoder::default().decode("[CAMARADAS DO EDU]: 1,2,3,4,5,6");
        let after = now_secs();
        let DecodeOutcome::Sample(sample) = outcome else {
            panic!("expected sample");
        };
        assert!(sample.timestamp >= before && sample.timestamp <= after);
    }
}
