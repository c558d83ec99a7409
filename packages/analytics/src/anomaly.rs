//! Streaming m-sigma anomaly detection.
//!
//! One forward pass with O(1) state: Welford's online algorithm keeps a
//! numerically stable running mean and sum of squared deviations, and
//! each value is flagged against the mean and standard deviation that
//! already include it. That post-update comparison slightly under-flags
//! early spikes; it is the defined behavior, kept as-is.

use serde::{Deserialize, Serialize};

/// Running first and second moments of a value stream.
///
/// Transient per-pass state of the detector; discarded when the pass
/// ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMoments {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the current mean.
    m2: f64,
}

impl RunningMoments {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one value into the running moments.
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        #[allow(clippy::cast_precision_loss)]
        let count = self.count as f64;
        self.mean += delta / count;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    /// Number of values seen so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Running mean of the values seen so far.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (`m2 / (n - 1)`), or `None` for fewer than two
    /// values.
    #[must_use]
    pub fn sample_variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let degrees_of_freedom = (self.count - 1) as f64;
        Some(self.m2 / degrees_of_freedom)
    }

    /// Sample standard deviation, or `None` for fewer than two values.
    #[must_use]
    pub fn std_dev(&self) -> Option<f64> {
        self.sample_variance().map(f64::sqrt)
    }
}

/// Per-value output of the anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    /// Zero-based position of the value in the input sequence.
    pub index: usize,
    /// The value itself.
    pub value: f64,
    /// Whether the value deviates from the running mean by more than
    /// `m` standard deviations.
    pub is_anomaly: bool,
}

/// Flags each value whose absolute deviation from the running mean
/// exceeds `m` standard deviations.
///
/// Lazy: values are pulled one at a time, so the input may be unbounded.
/// For the first value (and any point where the standard deviation is
/// zero) `is_anomaly` is always `false` — there is no spread to deviate
/// from. The mean and standard deviation used for each flag include the
/// value being judged.
pub fn detect_anomalies<I>(values: I, m: f64) -> impl Iterator<Item = AnomalyFlag>
where
    I: IntoIterator<Item = f64>,
{
    let mut moments = RunningMoments::new();

    values.into_iter().enumerate().map(move |(index, value)| {
        moments.push(value);

        let is_anomaly = moments
            .std_dev()
            .is_some_and(|std| std > 0.0 && (value - moments.mean()).abs() > m * std);

        AnomalyFlag {
            index,
            value,
            is_anomaly,
        }
    })
}
