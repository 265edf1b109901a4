//! Backward-difference jerk estimation.
//!
//! Timestamps are receipt times, so consecutive samples can share a timestamp
//! or even go backwards when the host clock is adjusted. Such steps yield zero
//! jerk instead of a division by a non-positive interval.

use crate::collector::types::{DerivedSample, Sample};

/// Differentiates the acceleration channels against elapsed time.
#[derive(Debug, Clone, Default)]
pub struct DerivativeEstimator {
    previous: Option<Sample>,
}

impl DerivativeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive jerk for `sample` and remember it as the new base.
    pub fn update(&mut self, sample: Sample) -> DerivedSample {
        let derived = match self.previous {
            Some(previous) => {
                let dt = sample.timestamp - previous.timestamp;
                if dt > 0.0 {
                    DerivedSample {
                        sample,
                        jerk_x: (sample.ax - previous.ax) / dt,
                        jerk_y: (sample.ay - previous.ay) / dt,
                        jerk_z: (sample.az - previous.az) / dt,
                    }
                } else {
                    // Covers NaN intervals too.
                    DerivedSample::at_rest(sample)
                }
            }
            None => DerivedSample::at_rest(sample),
        };

        self.previous = Some(sample);
        derived
    }

    /// The sample the next derivative will be taken against.
    pub fn previous(&self) -> Option<&Sample> {
        self.previous.as_ref()
    }

    /// Forget the base sample, as at the start of a new session.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, ax: f64, ay: f64, az: f64) -> Sample {
        Sample::new(t, [ax, ay, az], [0.0, 0.0, 0.0])
    }

    #[test]
    fn test_first_sample_has_zero_jerk() {
        let mut estimator = DerivativeEstimator::new();
        let derived = estimator.update(sample(5.0, 100.0, -3.0, 9.8));

        assert_eq!(derived.jerk(), [0.0, 0.0, 0.0]);
        assert_eq!(estimator.previous().map(|s| s.timestamp), Some(5.0));
    }

    #[test]
    fn test_backward_difference() {
        let mut estimator = DerivativeEstimator::new();
        estimator.update(sample(1.0, 0.0, 0.0, 0.0));
        let derived = estimator.update(sample(1.5, 10.0, -5.0, 2.0));

        assert_eq!(derived.jerk(), [20.0, -10.0, 4.0]);
    }

    #[test]
    fn test_gyro_channels_are_not_differentiated() {
        let mut estimator = DerivativeEstimator::new();
        estimator.update(Sample::new(0.0, [0.0; 3], [0.0; 3]));
        let derived = estimator.update(Sample::new(1.0, [0.0; 3], [100.0, 200.0, 300.0]));

        assert_eq!(derived.jerk(), [0.0, 0.0, 0.0]);
        assert_eq!(derived.sample.gyro(), [100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_duplicate_timestamp_yields_zero_and_rebases() {
        let mut estimator = DerivativeEstimator::new();
        estimator.update(sample(2.0, 0.0, 0.0, 0.0));
        let derived = estimator.update(sample(2.0, 50.0, 50.0, 50.0));
        assert_eq!(derived.jerk(), [0.0, 0.0, 0.0]);

        // The duplicate became the new base.
        let derived = estimator.update(sample(3.0, 60.0, 50.0, 40.0));
        assert_eq!(derived.jerk(), [10.0, 0.0, -10.0]);
    }

    #[test]
    fn test_decreasing_timestamp_yields_zero_and_rebases() {
        let mut estimator = DerivativeEstimator::new();
        estimator.update(sample(10.0, 0.0, 0.0, 0.0));
        let derived = estimator.update(sample(9.0, 1000.0, 0.0, 0.0));
        assert_eq!(derived.jerk(), [0.0, 0.0, 0.0]);

        let derived = estimator.update(sample(9.5, 1001.0, 0.0, 0.0));
        assert_eq!(derived.jerk_x, 2.0);
    }

    #[test]
    fn test_reset_forgets_previous() {
        let mut estimator = DerivativeEstimator::new();
        estimator.update(sample(0.0, 0.0, 0.0, 0.0));
        estimator.reset();
        assert!(estimator.previous().is_none());

        let derived = estimator.update(sample(1.0, 100.0, 0.0, 0.0));
        assert_eq!(derived.jerk_x, 0.0);
    }
}
