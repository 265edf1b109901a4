//! Fixed-capacity sliding window of derived samples for plotting.
//!
//! Rows are stored whole, so every channel in a snapshot has the same length
//! and index `i` of each channel refers to the same sample. Eviction removes
//! a whole row.

use crate::collector::types::DerivedSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of samples kept for the plots.
pub const DEFAULT_CAPACITY: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Row {
    time: f64,
    accel: [f64; 3],
    gyro: [f64; 3],
    jerk: [f64; 3],
}

/// Column-wise copy of the buffer contents, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    /// Seconds since the first sample of the session
    pub time: Vec<f64>,
    /// ax, ay, az
    pub accel: [Vec<f64>; 3],
    /// gx, gy, gz
    pub gyro: [Vec<f64>; 3],
    /// jerk x, y, z
    pub jerk: [Vec<f64>; 3],
}

impl SeriesSnapshot {
    fn with_capacity(capacity: usize) -> Self {
        let column = || Vec::with_capacity(capacity);
        Self {
            time: column(),
            accel: [column(), column(), column()],
            gyro: [column(), column(), column()],
            jerk: [column(), column(), column()],
        }
    }

    /// Number of samples in the snapshot.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// True when every channel has the same length as `time`.
    pub fn is_aligned(&self) -> bool {
        let n = self.time.len();
        self.accel
            .iter()
            .chain(self.gyro.iter())
            .chain(self.jerk.iter())
            .all(|column| column.len() == n)
    }
}

/// Ring buffer of the most recent derived samples.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    capacity: usize,
    rows: VecDeque<Row>,
    /// Timestamp of the first sample since creation or reset
    t0: Option<f64>,
}

impl TimeSeriesBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            rows: VecDeque::with_capacity(capacity),
            t0: None,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, derived: &DerivedSample) {
        let sample = &derived.sample;
        let t0 = *self.t0.get_or_insert(sample.timestamp);

        if self.rows.len() == self.capacity {
            self.rows.pop_front();
        }
        self.rows.push_back(Row {
            time: sample.timestamp - t0,
            accel: sample.accel(),
            gyro: sample.gyro(),
            jerk: derived.jerk(),
        });
    }

    /// Copy the contents out as aligned columns.
    pub fn snapshot(&self) -> SeriesSnapshot {
        let mut snapshot = SeriesSnapshot::with_capacity(self.rows.len());
        for row in &self.rows {
            snapshot.time.push(row.time);
            for axis in 0..3 {
                snapshot.accel[axis].push(row.accel[axis]);
                snapshot.gyro[axis].push(row.gyro[axis]);
                snapshot.jerk[axis].push(row.jerk[axis]);
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Session start timestamp, once a sample has been pushed.
    pub fn t0(&self) -> Option<f64> {
        self.t0
    }

    /// Drop all samples and the session start time.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.t0 = None;
    }
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::Sample;

    fn derived(t: f64, value: f64) -> DerivedSample {
        DerivedSample {
            sample: Sample::new(t, [value, value + 0.1, value + 0.2], [-value; 3]),
            jerk_x: value * 10.0,
            jerk_y: value * 20.0,
            jerk_z: value * 30.0,
        }
    }

    #[test]
    fn test_times_are_relative_to_first_sample() {
        let mut buffer = TimeSeriesBuffer::new(10);
        buffer.push(&derived(100.0, 1.0));
        buffer.push(&derived(100.5, 2.0));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.time, vec![0.0, 0.5]);
        assert_eq!(buffer.t0(), Some(100.0));
    }

    #[test]
    fn test_overflow_keeps_last_samples_aligned() {
        let mut buffer = TimeSeriesBuffer::new(3);
        for i in 0..5 {
            buffer.push(&derived(i as f64, i as f64));
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.is_aligned());
        assert_eq!(snapshot.time, vec![2.0, 3.0, 4.0]);
        assert_eq!(snapshot.accel[0], vec![2.0, 3.0, 4.0]);
        assert_eq!(snapshot.gyro[2], vec![-2.0, -3.0, -4.0]);
        assert_eq!(snapshot.jerk[0], vec![20.0, 30.0, 40.0]);
        assert_eq!(snapshot.jerk[2], vec![60.0, 90.0, 120.0]);
    }

    #[test]
    fn test_t0_survives_eviction() {
        let mut buffer = TimeSeriesBuffer::new(2);
        for i in 0..4 {
            buffer.push(&derived(10.0 + i as f64, 0.0));
        }
        assert_eq!(buffer.snapshot().time, vec![2.0, 3.0]);
    }

    #[test]
    fn test_out_of_order_timestamps_are_stored_as_given() {
        let mut buffer = TimeSeriesBuffer::new(5);
        buffer.push(&derived(10.0, 0.0));
        buffer.push(&derived(12.0, 0.0));
        buffer.push(&derived(11.0, 0.0));

        assert_eq!(buffer.snapshot().time, vec![0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_clear_resets_session_start() {
        let mut buffer = TimeSeriesBuffer::new(5);
        buffer.push(&derived(10.0, 0.0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.t0(), None);

        buffer.push(&derived(50.0, 0.0));
        assert_eq!(buffer.snapshot().time, vec![0.0]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = TimeSeriesBuffer::new(0);
        buffer.push(&derived(0.0, 1.0));
        buffer.push(&derived(1.0, 2.0));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot().accel[0], vec![2.0]);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = TimeSeriesBuffer::default().snapshot();
        assert!(snapshot.is_empty());
        assert!(snapshot.is_aligned());
    }
}
