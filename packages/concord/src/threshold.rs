use std::borrow::Cow;
use std::fmt::{self, Display};

use crate::Statistics;

/// Name fragments that exclude an event from threshold checks unless configured otherwise.
///
/// These match call-path renderings and file-path-like names, whose extremes are already
/// covered by the events they were derived from.
const DEFAULT_EXCLUSIONS: &[&str] = &["=>", "/"];

/// Decides when an observation is an anomalous extreme that deserves a marker event.
///
/// When an observation undercuts the running minimum (or exceeds the running maximum) by more
/// than `relative_threshold` times the magnitude of that extreme, the registry triggers a
/// derived marker event named after the original event, in addition to the normal update.
/// Marker events themselves are never checked, so markers cannot cascade.
///
/// Threshold checks are disabled unless a policy is given to the registry builder.
///
/// # Example
///
/// ```
/// use concord::{Registry, ThresholdPolicy};
///
/// let registry = Registry::builder()
///     .threshold(ThresholdPolicy::new(0.5))
///     .build();
///
/// let latency = registry.register_event("latency_ms");
/// registry.trigger_event(&latency, 100.0);
/// registry.trigger_event(&latency, 400.0); // Exceeds the maximum of 100 by 300%.
///
/// assert!(registry.find_event("latency_ms [MAX_MARKER]").is_some());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdPolicy {
    relative_threshold: f64,

    /// Events whose names contain any of these are never checked.
    excluded_fragments: Vec<Cow<'static, str>>,

    /// Extremes are only trusted once this many observations have been made.
    min_observations: u64,
}

impl ThresholdPolicy {
    /// Creates a policy that flags deviations larger than `relative_threshold` times
    /// the magnitude of the current extreme.
    ///
    /// # Panics
    ///
    /// Panics if `relative_threshold` is negative, NaN or infinite.
    #[must_use]
    pub fn new(relative_threshold: f64) -> Self {
        assert!(
            relative_threshold.is_finite() && relative_threshold >= 0.0,
            "relative threshold must be a finite non-negative number"
        );

        Self {
            relative_threshold,
            excluded_fragments: DEFAULT_EXCLUSIONS
                .iter()
                .map(|fragment| Cow::Borrowed(*fragment))
                .collect(),
            min_observations: 1,
        }
    }

    /// Excludes events whose names contain `fragment` from threshold checks.
    #[must_use]
    pub fn exclude_containing(mut self, fragment: impl Into<Cow<'static, str>>) -> Self {
        self.excluded_fragments.push(fragment.into());
        self
    }

    /// Removes all name exclusions, including the default ones.
    #[must_use]
    pub fn without_exclusions(mut self) -> Self {
        self.excluded_fragments.clear();
        self
    }

    /// Requires at least `count` prior observations before an extreme is trusted.
    ///
    /// Defaults to 1.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn with_min_observations(self, count: u64) -> Self {
        assert!(count > 0, "at least one prior observation is required");

        Self {
            min_observations: count,
            ..self
        }
    }

    /// The relative deviation beyond which an observation is flagged.
    #[must_use]
    pub fn relative_threshold(&self) -> f64 {
        self.relative_threshold
    }

    /// Whether events with this name are subject to threshold checks.
    #[must_use]
    pub fn applies_to(&self, name: &str) -> bool {
        !self
            .excluded_fragments
            .iter()
            .any(|fragment| name.contains(fragment.as_ref()))
    }

    /// Decides whether observing `value` on top of `previous` is an anomalous extreme.
    ///
    /// Must be called before `value` is recorded into `previous`.
    #[must_use]
    pub fn evaluate(&self, previous: &Statistics, value: f64) -> Option<Extreme> {
        if previous.count() < self.min_observations {
            return None;
        }

        let below_min = previous
            .min()
            .is_some_and(|min| value < min && min - value > self.relative_threshold * min.abs());

        if below_min {
            return Some(Extreme::Min);
        }

        let above_max = previous
            .max()
            .is_some_and(|max| value > max && value - max > self.relative_threshold * max.abs());

        above_max.then_some(Extreme::Max)
    }
}

/// Which running extreme an anomalous observation deviated from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Extreme {
    /// The observation fell far below the running minimum.
    Min,

    /// The observation rose far above the running maximum.
    Max,
}

impl Extreme {
    /// The name of the marker event derived from the event named `event_name`.
    #[must_use]
    pub fn marker_name(self, event_name: &str) -> String {
        format!("{event_name} [{self}_MARKER]")
    }
}

impl Display for Extreme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::StatisticsConfig;

    fn stats_of(values: &[f64]) -> Statistics {
        let mut stats = Statistics::new(StatisticsConfig::all());

        for &value in values {
            stats.record(value, 1, None);
        }

        stats
    }

    #[test]
    fn large_jump_above_max_is_flagged() {
        let policy = ThresholdPolicy::new(0.5);
        let previous = stats_of(&[10.0, 20.0]);

        assert_eq!(policy.evaluate(&previous, 31.0), Some(Extreme::Max));
        assert_eq!(policy.evaluate(&previous, 29.0), None);
    }

    #[test]
    fn large_drop_below_min_is_flagged() {
        let policy = ThresholdPolicy::new(0.5);
        let previous = stats_of(&[10.0, 20.0]);

        assert_eq!(policy.evaluate(&previous, 4.0), Some(Extreme::Min));
        assert_eq!(policy.evaluate(&previous, 6.0), None);
    }

    #[test]
    fn values_inside_range_are_never_flagged() {
        let policy = ThresholdPolicy::new(0.0);
        let previous = stats_of(&[10.0, 20.0]);

        assert_eq!(policy.evaluate(&previous, 15.0), None);
        assert_eq!(policy.evaluate(&previous, 10.0), None);
        assert_eq!(policy.evaluate(&previous, 20.0), None);
    }

    #[test]
    fn first_observation_is_never_flagged() {
        let policy = ThresholdPolicy::new(0.1);

        assert_eq!(policy.evaluate(&stats_of(&[]), 1_000_000.0), None);
    }

    #[test]
    fn min_observations_delays_checks() {
        let policy = ThresholdPolicy::new(0.1).with_min_observations(3);

        assert_eq!(policy.evaluate(&stats_of(&[1.0, 1.0]), 100.0), None);
        assert_eq!(
            policy.evaluate(&stats_of(&[1.0, 1.0, 1.0]), 100.0),
            Some(Extreme::Max)
        );
    }

    #[test]
    fn untracked_extremes_are_never_flagged() {
        let policy = ThresholdPolicy::new(0.1);
        let mut previous = Statistics::new(StatisticsConfig::count_only());
        previous.record(1.0, 1, None);

        assert_eq!(policy.evaluate(&previous, 100.0), None);
        assert_eq!(policy.evaluate(&previous, -100.0), None);
    }

    #[test]
    fn default_exclusions_skip_callpaths_and_paths() {
        let policy = ThresholdPolicy::new(0.1);

        assert!(policy.applies_to("compute"));
        assert!(!policy.applies_to("main => compute"));
        assert!(!policy.applies_to("src/io.c"));

        let custom = policy.without_exclusions().exclude_containing("tmp");
        assert!(custom.applies_to("main => compute"));
        assert!(!custom.applies_to("tmp_buffer"));
    }

    #[test]
    #[should_panic]
    fn negative_threshold_panics() {
        drop(ThresholdPolicy::new(-0.5));
    }

    #[test]
    #[should_panic]
    fn nan_threshold_panics() {
        drop(ThresholdPolicy::new(f64::NAN));
    }

    #[test]
    fn marker_names_identify_extreme() {
        assert_eq!(Extreme::Min.marker_name("io"), "io [MIN_MARKER]");
        assert_eq!(Extreme::Max.marker_name("io"), "io [MAX_MARKER]");
    }
}
