use std::time::Instant;

/// Selects which statistics are tracked for the events of a [`Registry`][crate::Registry].
///
/// The observation count and the last observed value are always tracked. Each of the others
/// can be switched off individually, in which case its accumulator is simply never updated.
/// A disabled statistic is never computed retroactively by enabling it later - the setting is
/// fixed when the registry is built.
///
/// # Example
///
/// ```
/// use concord::StatisticsConfig;
///
/// let config = StatisticsConfig::all().with_stddev(false);
///
/// assert!(config.tracks_mean());
/// assert!(!config.tracks_stddev());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatisticsConfig {
    min: bool,
    max: bool,
    mean: bool,
    stddev: bool,
}

impl StatisticsConfig {
    /// Tracks every statistic. This is the default.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            min: true,
            max: true,
            mean: true,
            stddev: true,
        }
    }

    /// Tracks only the observation count and the last observed value.
    #[must_use]
    pub const fn count_only() -> Self {
        Self {
            min: false,
            max: false,
            mean: false,
            stddev: false,
        }
    }

    /// Enables or disables tracking of the minimum observed value.
    #[must_use]
    pub const fn with_min(self, enabled: bool) -> Self {
        Self {
            min: enabled,
            ..self
        }
    }

    /// Enables or disables tracking of the maximum observed value.
    #[must_use]
    pub const fn with_max(self, enabled: bool) -> Self {
        Self {
            max: enabled,
            ..self
        }
    }

    /// Enables or disables tracking of the running sum, from which the mean is derived.
    #[must_use]
    pub const fn with_mean(self, enabled: bool) -> Self {
        Self {
            mean: enabled,
            ..self
        }
    }

    /// Enables or disables tracking of the running sum of squares, from which
    /// the standard deviation is derived.
    #[must_use]
    pub const fn with_stddev(self, enabled: bool) -> Self {
        Self {
            stddev: enabled,
            ..self
        }
    }

    /// Whether the minimum observed value is tracked.
    #[must_use]
    pub const fn tracks_min(&self) -> bool {
        self.min
    }

    /// Whether the maximum observed value is tracked.
    #[must_use]
    pub const fn tracks_max(&self) -> bool {
        self.max
    }

    /// Whether the mean is tracked.
    #[must_use]
    pub const fn tracks_mean(&self) -> bool {
        self.mean
    }

    /// Whether the standard deviation is tracked.
    #[must_use]
    pub const fn tracks_stddev(&self) -> bool {
        self.stddev
    }

    // The standard deviation is derived from the sum as well as the sum of squares.
    const fn tracks_sum(&self) -> bool {
        self.mean || self.stddev
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self::all()
    }
}

/// Running statistics of the observations of one event on one thread.
///
/// Only the accumulators are stored. The mean and standard deviation are derived from them
/// on demand, which keeps each update O(1) and free of accumulated rounding error.
///
/// Accessors return `None` when there are no observations yet or when the statistic is
/// not tracked under the active [`StatisticsConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Statistics {
    config: StatisticsConfig,

    count: u64,
    last_value: f64,
    last_timestamp: Option<Instant>,

    // Identity values (+inf, -inf, 0) until the first observation.
    min: f64,
    max: f64,
    sum: f64,
    sum_of_squares: f64,
}

impl Statistics {
    /// Creates an empty accumulator that tracks the statistics selected by `config`.
    #[must_use]
    pub fn new(config: StatisticsConfig) -> Self {
        Self {
            config,
            count: 0,
            last_value: 0.0,
            last_timestamp: None,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_of_squares: 0.0,
        }
    }

    /// Records `count` observations of `value`.
    ///
    /// A zero `count` is ignored.
    pub fn record(&mut self, value: f64, count: u64, timestamp: Option<Instant>) {
        if count == 0 {
            return;
        }

        self.count = self.count.saturating_add(count);
        self.last_value = value;

        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }

        if self.config.min {
            self.min = self.min.min(value);
        }

        if self.config.max {
            self.max = self.max.max(value);
        }

        let weight = as_f64(count);

        if self.config.tracks_sum() {
            self.sum += value * weight;
        }

        if self.config.stddev {
            self.sum_of_squares += value * value * weight;
        }
    }

    /// Merges another accumulator into this one, as if all of its observations
    /// had been recorded here.
    ///
    /// This is used to combine the statistics of different threads for reporting.
    /// The last value of the merged result is the one with the later timestamp, preferring
    /// `self` if that cannot be determined.
    pub fn merge_from(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }

        let other_is_later = match (self.last_timestamp, other.last_timestamp) {
            (Some(ours), Some(theirs)) => theirs > ours,
            (None, Some(_)) => true,
            _ => self.count == 0,
        };

        if other_is_later {
            self.last_value = other.last_value;
            self.last_timestamp = other.last_timestamp;
        }

        self.count = self.count.saturating_add(other.count);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
    }

    /// The statistics selected for tracking.
    #[must_use]
    pub fn config(&self) -> StatisticsConfig {
        self.config
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The most recently observed value.
    #[must_use]
    pub fn last_value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.last_value)
    }

    /// When the most recent observation was made, if it was timestamped.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<Instant> {
        self.last_timestamp
    }

    /// The smallest observed value.
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        (self.count > 0 && self.config.min).then_some(self.min)
    }

    /// The largest observed value.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        (self.count > 0 && self.config.max).then_some(self.max)
    }

    /// The sum of all observed values.
    #[must_use]
    pub fn sum(&self) -> Option<f64> {
        (self.count > 0 && self.config.tracks_sum()).then_some(self.sum)
    }

    /// The sum of the squares of all observed values.
    #[must_use]
    pub fn sum_of_squares(&self) -> Option<f64> {
        (self.count > 0 && self.config.stddev).then_some(self.sum_of_squares)
    }

    /// The arithmetic mean of all observed values.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if !self.config.mean {
            return None;
        }

        self.sum().map(|sum| sum / as_f64(self.count))
    }

    /// The population standard deviation of all observed values.
    #[must_use]
    pub fn stddev(&self) -> Option<f64> {
        let sum_of_squares = self.sum_of_squares()?;
        let count = as_f64(self.count);
        let mean = self.sum / count;

        // Rounding can push the variance of near-constant data slightly below zero.
        let variance = (sum_of_squares / count - mean * mean).max(0.0);

        Some(variance.sqrt())
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "counts beyond 2^53 lose precision - acceptable for statistics"
)]
fn as_f64(count: u64) -> f64 {
    count as f64
}
