use std::num::NonZero;
use std::sync::Arc;
use std::time::Instant;

use foldhash::HashMap;
use num_traits::AsPrimitive;
use parking_lot::RwLock;
use tracing::trace;

use crate::{
    CallpathKeyer, ContextKey, EventHandle, EventKind, EventRecord, Identity, NamespaceId,
    RegistryBuilder, Report, Statistics, StatisticsConfig, ThresholdPolicy,
};

/// The measurement database of one process for one namespace.
///
/// Maps each distinct event name to exactly one [`EventRecord`] and records the observations
/// of every thread into per-thread [`Statistics`]. All methods take `&self` and may be called
/// concurrently from any number of threads.
///
/// A registry is an explicit service object rather than global state. Create one per namespace
/// at process start (for example, one for functions and one for counters) and share it with
/// the instrumentation, typically via `Arc`. Independent registries never interact, so a test
/// can simulate many ranks in one process by creating one registry per simulated rank.
///
/// # Example
///
/// ```
/// use concord::Registry;
///
/// let registry = Registry::new();
///
/// let loop_iter = registry.register_event("loop-iter");
///
/// for value in [1, 2, 3, 4, 5] {
///     registry.trigger_event(&loop_iter, value);
/// }
///
/// let stats = registry.current_thread_statistics(&loop_iter).unwrap();
/// assert_eq!(stats.count(), 5);
/// assert_eq!(stats.mean(), Some(3.0));
/// ```
///
/// # Locking
///
/// Registering a new name takes the registry-wide write lock. The first observation of an event
/// by a thread takes a write lock on that event's record. All other observations only take
/// shared locks plus the lock of the thread's own statistics slot.
#[derive(Debug)]
pub struct Registry {
    namespace: NamespaceId,
    config: StatisticsConfig,
    threshold: Option<ThresholdPolicy>,
    identity: Arc<dyn Identity>,

    events: RwLock<EventTable>,
    callpaths: CallpathKeyer,
}

#[derive(Debug, Default)]
struct EventTable {
    by_name: HashMap<Arc<str>, EventHandle>,

    /// Indexed by local id.
    by_id: Vec<EventHandle>,
}

impl Registry {
    /// Creates a new registry builder with the default builder configuration.
    #[cfg_attr(test, mutants::skip)] // Gets replaced with itself by different name, bad mutation.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub(crate) fn new_with(
        namespace: NamespaceId,
        config: StatisticsConfig,
        callpath_depth: NonZero<usize>,
        threshold: Option<ThresholdPolicy>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            namespace,
            config,
            threshold,
            identity,
            events: RwLock::new(EventTable::default()),
            callpaths: CallpathKeyer::new(callpath_depth),
        }
    }

    /// The namespace whose events this registry holds.
    #[must_use]
    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// The statistics tracked for every event of the registry.
    #[must_use]
    pub fn statistics_config(&self) -> StatisticsConfig {
        self.config
    }

    /// How many enclosing frames distinguish the call paths of context events.
    #[must_use]
    pub fn callpath_depth(&self) -> NonZero<usize> {
        self.callpaths.depth()
    }

    /// The policy for synthesizing marker events, if enabled.
    #[must_use]
    pub fn threshold(&self) -> Option<&ThresholdPolicy> {
        self.threshold.as_ref()
    }

    /// Registers an event, returning the existing record if the name is already registered.
    ///
    /// A new event receives the next local id. Repeated registration of the same name always
    /// returns a handle to the same record, regardless of the kind it was registered with.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn register_event(&self, name: &str) -> EventHandle {
        self.register(name, EventKind::Plain)
    }

    /// Registers an event whose values are expected to be non-decreasing.
    ///
    /// Otherwise identical to [`register_event()`][Self::register_event].
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn register_monotonic_event(&self, name: &str) -> EventHandle {
        self.register(name, EventKind::Monotonic)
    }

    pub(crate) fn register(&self, name: &str, kind: EventKind) -> EventHandle {
        assert!(!name.is_empty(), "event name must not be empty");

        if let Some(existing) = self.events.read().by_name.get(name) {
            return existing.clone();
        }

        let mut events = self.events.write();

        // Another thread may have registered the name while we were waiting for the lock.
        if let Some(existing) = events.by_name.get(name) {
            return existing.clone();
        }

        let local_id = events.by_id.len();
        let name: Arc<str> = Arc::from(name);

        let threshold_checked = kind != EventKind::Marker
            && self
                .threshold
                .as_ref()
                .is_some_and(|policy| policy.applies_to(&name));

        trace!(namespace = %self.namespace, event = %name, local_id, %kind, "registering event");

        let handle = EventHandle::new(EventRecord::new(
            Arc::clone(&name),
            local_id,
            kind,
            self.config,
            threshold_checked,
        ));

        events.by_name.insert(name, handle.clone());
        events.by_id.push(handle.clone());

        handle
    }

    /// Looks up a registered event by name.
    #[must_use]
    pub fn find_event(&self, name: &str) -> Option<EventHandle> {
        self.events.read().by_name.get(name).cloned()
    }

    /// Looks up a registered event by local id.
    #[must_use]
    pub fn event(&self, local_id: usize) -> Option<EventHandle> {
        self.events.read().by_id.get(local_id).cloned()
    }

    /// The number of distinct events registered so far.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.read().by_id.len()
    }

    /// Records one observation of `value` by the current thread, stamped with the current time.
    pub fn trigger_event(&self, event: &EventHandle, value: impl AsPrimitive<f64>) {
        let timestamp = self.identity.now();
        self.observe(
            event,
            self.identity.current_thread_id(),
            value.as_(),
            1,
            Some(timestamp),
        );
    }

    /// Records one observation of `value` by the current thread, made at `timestamp`.
    pub fn trigger_event_at(
        &self,
        event: &EventHandle,
        value: impl AsPrimitive<f64>,
        timestamp: Instant,
    ) {
        self.observe(
            event,
            self.identity.current_thread_id(),
            value.as_(),
            1,
            Some(timestamp),
        );
    }

    /// Records one observation of `value` on behalf of the thread `thread_id`.
    ///
    /// Use this when the instrumentation tracks thread ids itself.
    pub fn trigger_event_on(
        &self,
        event: &EventHandle,
        thread_id: usize,
        value: impl AsPrimitive<f64>,
        timestamp: Option<Instant>,
    ) {
        self.observe(event, thread_id, value.as_(), 1, timestamp);
    }

    /// Records `count` observations of the same `value` by the current thread.
    ///
    /// This is equivalent to but cheaper than `count` calls to
    /// [`trigger_event()`][Self::trigger_event].
    pub fn trigger_event_batch(&self, event: &EventHandle, value: impl AsPrimitive<f64>, count: u64) {
        let timestamp = self.identity.now();
        self.observe(
            event,
            self.identity.current_thread_id(),
            value.as_(),
            count,
            Some(timestamp),
        );
    }

    fn observe(
        &self,
        event: &EventHandle,
        thread_id: usize,
        value: f64,
        count: u64,
        timestamp: Option<Instant>,
    ) {
        debug_assert!(
            self.event(event.local_id()).as_ref() == Some(event),
            "event {} does not belong to this registry",
            event.name()
        );

        let policy = self
            .threshold
            .as_ref()
            .filter(|_| event.is_threshold_checked());

        let extreme = event.with_thread_statistics(thread_id, |stats| {
            let extreme = policy.and_then(|policy| policy.evaluate(stats, value));
            stats.record(value, count, timestamp);
            extreme
        });

        // The statistics lock is released before the marker is registered because
        // registration takes the registry-wide lock.
        if let Some(extreme) = extreme {
            let marker = self.register(&extreme.marker_name(event.name()), EventKind::Marker);

            trace!(event = event.name(), value, %extreme, "anomalous extreme observed");

            // Marker events are never threshold checked, so this does not recurse further.
            self.observe(&marker, thread_id, value, count, timestamp);
        }
    }

    /// Records an observation of `value` by the current thread both on `event` and on the
    /// context event that identifies the call path `stack` leading to it.
    ///
    /// `stack` lists the enclosing active calls, outermost first. All frames must be events of
    /// one registry (typically the function registry), which may or may not be this one. Only
    /// the innermost [`callpath_depth()`][Self::callpath_depth] frames are considered.
    ///
    /// The base event is always triggered. Returns the context event that was triggered in
    /// addition, or `None` if `stack` is empty and there is no call path to distinguish.
    pub fn trigger_in_context(
        &self,
        event: &EventHandle,
        stack: &[EventHandle],
        value: impl AsPrimitive<f64>,
    ) -> Option<EventHandle> {
        let value = value.as_();
        let thread_id = self.identity.current_thread_id();
        let timestamp = Some(self.identity.now());

        self.observe(event, thread_id, value, 1, timestamp);

        if stack.is_empty() {
            return None;
        }

        let key = self.context_key(event, stack);
        let context_event = self.resolve_context(&key, event, stack);

        self.observe(&context_event, thread_id, value, 1, timestamp);

        Some(context_event)
    }

    /// Derives the key that identifies the call path `stack` leading to `event`.
    ///
    /// See [`ContextKey`] for the structure of the key.
    #[must_use]
    pub fn context_key(&self, event: &EventRecord, stack: &[EventHandle]) -> ContextKey {
        self.callpaths.key_for(event, stack)
    }

    /// Returns the context event identified by `key`, registering it if this is the first time
    /// the call path is seen.
    ///
    /// `key` must have been derived from the same `event` and `stack` by
    /// [`context_key()`][Self::context_key]. The name of a new context event renders the
    /// call path as `"caller => ... => event"`.
    pub fn resolve_context(
        &self,
        key: &ContextKey,
        event: &EventRecord,
        stack: &[EventHandle],
    ) -> EventHandle {
        self.callpaths.resolve(key, || {
            self.register(&CallpathKeyer::render(key, event, stack), EventKind::Context)
        })
    }

    /// A copy of the statistics that thread `thread_id` has recorded for `event`.
    ///
    /// Returns `None` if that thread has never observed the event.
    #[must_use]
    pub fn statistics(&self, event: &EventRecord, thread_id: usize) -> Option<Statistics> {
        event.statistics(thread_id)
    }

    /// A copy of the statistics that the current thread has recorded for `event`.
    #[must_use]
    pub fn current_thread_statistics(&self, event: &EventRecord) -> Option<Statistics> {
        event.statistics(self.identity.current_thread_id())
    }

    /// All registered events, in local id order.
    ///
    /// Events registered concurrently with this call may or may not be included. Callers that
    /// need a stable view, such as unification, must call this after registration has quiesced.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventHandle> {
        self.events.read().by_id.clone()
    }

    /// Summarizes the statistics of every registered event, combining all threads.
    #[must_use]
    pub fn report(&self) -> Report {
        Report::collect(self)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
