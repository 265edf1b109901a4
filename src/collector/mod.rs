//! Telemetry collection for the IMU event monitor.
//!
//! This module owns the transport side of the link: the sample types that
//! flow down the pipeline and the reader that turns a byte stream into lines.

pub mod serial;
pub mod types;

// Re-export commonly used types
pub use serial::{
    LineRead, LineReader, SerialSettings, TransportError, DEFAULT_BAUD_RATE, DEFAULT_LINE_CAPACITY,
};
pub use types::{
    DerivedSample, Edge, EventKind, EventTransition, Sample, WIRE_FIELD_COUNT, WIRE_HEADER,
};
