//! Core processing for the IMU event monitor.
//!
//! This module contains:
//! - Line decoding into samples
//! - Jerk estimation
//! - Hysteresis event classification
//! - The plot buffer and the per-sample pipeline that feeds it
//! - The single-slot frame hand-off to the renderer

pub mod decoder;
pub mod derivative;
pub mod events;
pub mod pipeline;
pub mod series;
pub mod slot;

// Re-export commonly used types
pub use decoder::{encode_line, DecodeError, DecodeOutcome, DecodeReason, FrameDecoder};
pub use derivative::DerivativeEstimator;
pub use events::{EventClassifier, EventState, ThresholdSet, Trigger, Units};
pub use pipeline::{LineOutcome, Pipeline, RateCoordinator, Throughput};
pub use series::{SeriesSnapshot, TimeSeriesBuffer, DEFAULT_CAPACITY};
pub use slot::{Frame, FrameSlot, MAX_PENDING_TRANSITIONS};
