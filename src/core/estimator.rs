//! Rolling estimate of synthesis time per input character.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Maximum number of samples kept
pub const SAMPLE_CAPACITY: usize = 5;

/// Input sizes (characters) that always produce a new sample
pub const RECALIBRATION_BAND: std::ops::RangeInclusive<usize> = 3000..=4000;

/// One observed synthesis call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub input_size: usize,
    pub duration_secs: f64,
}

/// Predicts synthesis duration from a FIFO window of samples
#[derive(Debug, Clone, Default)]
pub struct TimingEstimator {
    samples: VecDeque<TimingSample>,
}

impl TimingEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the estimator; only the newest `SAMPLE_CAPACITY` samples are kept
    pub fn from_samples(samples: impl IntoIterator<Item = TimingSample>) -> Self {
        let mut estimator = Self::new();
        for sample in samples {
            estimator.push(sample);
        }
        estimator
    }

    /// Predicted duration in seconds, or `None` with no samples yet
    pub fn predict(&self, size: usize) -> Option<f64> {
        let size = size as f64;

        if self.samples.len() < 3 {
            let last = self.samples.back()?;
            if last.input_size == 0 {
                return None;
            }
            return Some(last.duration_secs / last.input_size as f64 * size);
        }

        let total_size: usize = self.samples.iter().map(|s| s.input_size).sum();
        if total_size == 0 {
            return None;
        }
        let total_duration: f64 = self.samples.iter().map(|s| s.duration_secs).sum();
        Some(total_duration / total_size as f64 * size)
    }

    /// Whether a call of this size would be recorded
    pub fn should_record(&self, size: usize) -> bool {
        self.samples.is_empty() || RECALIBRATION_BAND.contains(&size)
    }

    /// Add a sample if recalibration is warranted. Returns whether it was kept.
    pub fn record(&mut self, size: usize, duration_secs: f64) -> bool {
        if !self.should_record(size) {
            return false;
        }
        self.push(TimingSample {
            input_size: size,
            duration_secs,
        });
        true
    }

    fn push(&mut self, sample: TimingSample) {
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn samples(&self) -> impl Iterator<Item = &TimingSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// How close an estimate came to the measured value, in percent
pub fn estimate_accuracy(estimated: f64, actual: f64) -> Option<f64> {
    if actual <= 0.0 {
        return None;
    }
    Some(100.0 - (estimated - actual).abs() / actual * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(input_size: usize, duration_secs: f64) -> TimingSample {
        TimingSample {
            input_size,
            duration_secs,
        }
    }

    #[test]
    fn test_no_samples_no_prediction() {
        assert_eq!(TimingEstimator::new().predict(1000), None);
    }

    #[test]
    fn test_single_sample_rate() {
        let estimator = TimingEstimator::from_samples([sample(1000, 10.0)]);
        assert_eq!(estimator.predict(2000), Some(20.0));
    }

    #[test]
    fn test_two_samples_use_latest_only() {
        let estimator = TimingEstimator::from_samples([sample(1000, 10.0), sample(1000, 30.0)]);
        assert_eq!(estimator.predict(1000), Some(30.0));
    }

    #[test]
    fn test_aggregate_rate() {
        let estimator = TimingEstimator::from_samples([
            sample(1000, 10.0),
            sample(2000, 18.0),
            sample(3000, 33.0),
        ]);
        let predicted = estimator.predict(1000).unwrap();
        assert!((predicted - 61.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_gating() {
        let mut estimator = TimingEstimator::new();

        // First sample is always taken
        assert!(estimator.record(120, 2.0));
        // Outside the band afterwards
        assert!(!estimator.record(2999, 30.0));
        assert!(!estimator.record(4001, 40.0));
        // Inside the band, both ends inclusive
        assert!(estimator.record(3000, 30.0));
        assert!(estimator.record(4000, 40.0));

        assert_eq!(estimator.len(), 3);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut estimator = TimingEstimator::new();
        for i in 0..6 {
            assert!(estimator.record(3000 + i, i as f64 + 1.0));
        }

        assert_eq!(estimator.len(), SAMPLE_CAPACITY);
        let first = estimator.samples().next().unwrap();
        assert_eq!(first.input_size, 3001);
    }

    #[test]
    fn test_zero_size_sample_gives_no_prediction() {
        let estimator = TimingEstimator::from_samples([sample(0, 1.0)]);
        assert_eq!(estimator.predict(100), None);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(estimate_accuracy(9.0, 10.0), Some(90.0));
        assert_eq!(estimate_accuracy(11.0, 10.0), Some(90.0));
        assert_eq!(estimate_accuracy(5.0, 0.0), None);
    }
}
