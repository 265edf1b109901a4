//! Per-sample processing pipeline and render-rate coordination.
//!
//! A decoded sample passes through the jerk estimator, the event classifier,
//! and the plot buffer in one step. Only after all three are updated is the
//! dirty flag raised, so a snapshot never lags behind an event it caused.
//!
//! The dirty flag is a single bit: any number of samples between two polls
//! produce one pending render, never a backlog.

use crate::collector::types::{EventTransition, Sample};
use crate::core::decoder::{now_secs, DecodeError, DecodeOutcome, FrameDecoder};
use crate::core::derivative::DerivativeEstimator;
use crate::core::events::{EventClassifier, ThresholdSet};
use crate::core::series::{SeriesSnapshot, TimeSeriesBuffer};
use serde::{Deserialize, Serialize};

/// Length of the interval the sample rate is counted over, in seconds.
const RATE_INTERVAL_SECS: f64 = 1.0;

/// Throughput figures for the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    /// Samples counted in the last completed one-second interval
    pub samples_per_second: u64,
    pub buffer_occupancy: usize,
    pub buffer_capacity: usize,
}

/// Tracks the sample rate and whether a new render is pending.
#[derive(Debug, Clone, Default)]
pub struct RateCoordinator {
    packet_count: u64,
    interval_start: Option<f64>,
    samples_per_second: u64,
    dirty: bool,
}

impl RateCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a sample received at `now` and mark the view dirty.
    pub fn record(&mut self, now: f64) {
        self.packet_count += 1;
        match self.interval_start {
            None => self.interval_start = Some(now),
            Some(start) if now - start >= RATE_INTERVAL_SECS => {
                self.samples_per_second = self.packet_count;
                self.packet_count = 0;
                self.interval_start = Some(now);
            }
            Some(_) => {}
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn samples_per_second(&self) -> u64 {
        self.samples_per_second
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// A sample was decoded and processed.
    Accepted(Vec<EventTransition>),
    /// The line carried no telemetry header.
    Ignored,
    /// The line had the header but a malformed payload. No state changed.
    Rejected(DecodeError),
}

/// Decoder, jerk estimator, classifier, and plot buffer for one session.
#[derive(Debug, Clone)]
pub struct Pipeline {
    decoder: FrameDecoder,
    derivative: DerivativeEstimator,
    classifier: EventClassifier,
    buffer: TimeSeriesBuffer,
    rate: RateCoordinator,
}

impl Pipeline {
    pub fn new(thresholds: ThresholdSet, buffer_capacity: usize) -> Self {
        Self::with_decoder(FrameDecoder::default(), thresholds, buffer_capacity)
    }

    pub fn with_decoder(
        decoder: FrameDecoder,
        thresholds: ThresholdSet,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            decoder,
            derivative: DerivativeEstimator::new(),
            classifier: EventClassifier::new(thresholds),
            buffer: TimeSeriesBuffer::new(buffer_capacity),
            rate: RateCoordinator::new(),
        }
    }

    /// Process a line received now.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        self.process_line_at(line, now_secs())
    }

    /// Process a line as if it had been received at `timestamp`.
    pub fn process_line_at(&mut self, line: &str, timestamp: f64) -> LineOutcome {
        match self.decoder.decode_at(line, timestamp) {
            DecodeOutcome::Sample(sample) => LineOutcome::Accepted(self.process_sample(sample)),
            DecodeOutcome::Ignored => LineOutcome::Ignored,
            DecodeOutcome::Error(e) => LineOutcome::Rejected(e),
        }
    }

    /// Run an already-decoded sample through the pipeline.
    pub fn process_sample(&mut self, sample: Sample) -> Vec<EventTransition> {
        let derived = self.derivative.update(sample);
        let transitions = self.classifier.classify(&sample);
        self.buffer.push(&derived);
        self.rate.record(sample.timestamp);
        transitions
    }

    /// Snapshot the buffer if anything changed since the last poll.
    pub fn poll_snapshot(&mut self) -> Option<SeriesSnapshot> {
        if self.rate.take_dirty() {
            Some(self.buffer.snapshot())
        } else {
            None
        }
    }

    /// Snapshot the buffer regardless of the dirty flag.
    pub fn snapshot(&self) -> SeriesSnapshot {
        self.buffer.snapshot()
    }

    pub fn is_dirty(&self) -> bool {
        self.rate.is_dirty()
    }

    pub fn throughput(&self) -> Throughput {
        Throughput {
            samples_per_second: self.rate.samples_per_second(),
            buffer_occupancy: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
        }
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    /// Return every stage to its empty, inactive state.
    pub fn reset(&mut self) {
        self.derivative.reset();
        self.classifier.reset();
        self.buffer.clear();
        self.rate.reset();
    }
}
