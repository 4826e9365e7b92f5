use std::num::NonZero;
use std::sync::Arc;

use new_zealand::nz;

use crate::{Identity, NamespaceId, Registry, StatisticsConfig, ThreadIdentity, ThresholdPolicy};

/// By default, context events distinguish observations by their two nearest enclosing frames.
const DEFAULT_CALLPATH_DEPTH: NonZero<usize> = nz!(2);

/// Creates instances of [`Registry`].
///
/// Every parameter is optional. Use `Registry::builder()` to create a new instance of this
/// builder.
///
/// # Example
///
/// ```
/// use concord::{NamespaceId, Registry, StatisticsConfig, ThresholdPolicy};
/// use new_zealand::nz;
///
/// let counters = Registry::builder()
///     .namespace(NamespaceId::COUNTERS)
///     .statistics(StatisticsConfig::all().with_stddev(false))
///     .callpath_depth(nz!(4))
///     .threshold(ThresholdPolicy::new(0.25))
///     .build();
///
/// assert_eq!(counters.namespace(), NamespaceId::COUNTERS);
/// ```
#[derive(Debug)]
#[must_use]
pub struct RegistryBuilder {
    namespace: NamespaceId,
    statistics: StatisticsConfig,
    callpath_depth: NonZero<usize>,
    threshold: Option<ThresholdPolicy>,
    identity: Arc<dyn Identity>,
}

impl RegistryBuilder {
    pub(crate) fn new() -> Self {
        Self {
            namespace: NamespaceId::default(),
            statistics: StatisticsConfig::default(),
            callpath_depth: DEFAULT_CALLPATH_DEPTH,
            threshold: None,
            identity: Arc::new(ThreadIdentity),
        }
    }

    /// Sets the namespace whose events this registry holds.
    ///
    /// Defaults to [`NamespaceId::FUNCTIONS`].
    pub fn namespace(self, namespace: NamespaceId) -> Self {
        Self { namespace, ..self }
    }

    /// Selects the statistics tracked for every event of the registry.
    ///
    /// Defaults to [`StatisticsConfig::all()`].
    pub fn statistics(self, statistics: StatisticsConfig) -> Self {
        Self { statistics, ..self }
    }

    /// Sets how many enclosing frames distinguish the call paths of context events.
    ///
    /// Defaults to 2.
    pub fn callpath_depth(self, callpath_depth: NonZero<usize>) -> Self {
        Self {
            callpath_depth,
            ..self
        }
    }

    /// Enables synthesis of marker events for anomalous extremes.
    ///
    /// Disabled by default.
    pub fn threshold(self, threshold: ThresholdPolicy) -> Self {
        Self {
            threshold: Some(threshold),
            ..self
        }
    }

    /// Replaces the provider of thread ids and timestamps.
    ///
    /// Defaults to [`ThreadIdentity`].
    pub fn identity(self, identity: Arc<dyn Identity>) -> Self {
        Self { identity, ..self }
    }

    /// Builds the registry with the current configuration.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry::new_with(
            self.namespace,
            self.statistics,
            self.callpath_depth,
            self.threshold,
            self.identity,
        )
    }
}
