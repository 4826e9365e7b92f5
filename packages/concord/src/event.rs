use std::fmt::{self, Display};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::trace;

use crate::{Statistics, StatisticsConfig};

/// The nature of an event, fixed when it is registered.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    /// An ordinary event registered by instrumentation.
    Plain,

    /// An event whose values are expected to be non-decreasing, such as a cumulative counter.
    ///
    /// This is informational - observations are recorded the same way as for plain events.
    Monotonic,

    /// An event derived by the registry to distinguish the call paths of a base event.
    Context,

    /// An event derived by the registry to flag anomalous extremes of another event.
    ///
    /// Marker events are never themselves checked against the threshold policy.
    Marker,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Monotonic => write!(f, "monotonic"),
            Self::Context => write!(f, "context"),
            Self::Marker => write!(f, "marker"),
        }
    }
}

/// Everything a [`Registry`][crate::Registry] knows about one distinct event name.
///
/// The statistics of each thread are kept in their own slot, allocated the first time that
/// thread observes the event. Updates to an existing slot only take a shared lock on the
/// record plus the slot's own lock, so threads observing the same event do not contend
/// with each other except while a new slot is being allocated.
#[derive(Debug)]
pub struct EventRecord {
    name: Arc<str>,
    local_id: usize,
    kind: EventKind,
    config: StatisticsConfig,

    /// Whether observations are checked against the registry's threshold policy.
    threshold_checked: bool,

    /// Indexed by thread id. `None` until that thread observes the event.
    per_thread: RwLock<Vec<Option<Mutex<Statistics>>>>,
}

impl EventRecord {
    pub(crate) fn new(
        name: Arc<str>,
        local_id: usize,
        kind: EventKind,
        config: StatisticsConfig,
        threshold_checked: bool,
    ) -> Self {
        Self {
            name,
            local_id,
            kind,
            config,
            threshold_checked,
            per_thread: RwLock::new(Vec::new()),
        }
    }

    /// The name of the event, unique within its registry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    /// The local id of the event, assigned densely in registration order starting from zero.
    #[must_use]
    pub fn local_id(&self) -> usize {
        self.local_id
    }

    /// The kind of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Whether the values of this event are expected to be non-decreasing.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        self.kind == EventKind::Monotonic
    }

    pub(crate) fn is_threshold_checked(&self) -> bool {
        self.threshold_checked
    }

    /// Runs `f` on the statistics slot of `thread_id`, allocating the slot if this
    /// is the first time that thread observes the event.
    pub(crate) fn with_thread_statistics<R>(
        &self,
        thread_id: usize,
        f: impl FnOnce(&mut Statistics) -> R,
    ) -> R {
        {
            let slots = self.per_thread.read();

            if let Some(Some(slot)) = slots.get(thread_id) {
                return f(&mut *slot.lock());
            }
        }

        let mut slots = self.per_thread.write();

        if slots.len() <= thread_id {
            slots.resize_with(thread_id.saturating_add(1), || None);
        }

        let slot = slots
            .get_mut(thread_id)
            .expect("resized above to include thread_id");

        if slot.is_none() {
            trace!(event = %self.name, thread_id, "allocating thread statistics");
            *slot = Some(Mutex::new(Statistics::new(self.config)));
        }

        // Other threads may proceed with their own slots while we finish the update.
        let slots = RwLockWriteGuard::downgrade(slots);

        let slot = slots
            .get(thread_id)
            .and_then(Option::as_ref)
            .expect("allocated above while holding the write lock");

        f(&mut *slot.lock())
    }

    /// A copy of the statistics recorded by `thread_id`, or `None` if that thread
    /// has never observed the event.
    #[must_use]
    pub fn statistics(&self, thread_id: usize) -> Option<Statistics> {
        self.per_thread
            .read()
            .get(thread_id)
            .and_then(Option::as_ref)
            .map(|slot| *slot.lock())
    }

    /// Copies of the statistics of every thread that has observed the event,
    /// in ascending order of thread id.
    #[must_use]
    pub fn thread_statistics(&self) -> Vec<(usize, Statistics)> {
        self.per_thread
            .read()
            .iter()
            .enumerate()
            .filter_map(|(thread_id, slot)| slot.as_ref().map(|slot| (thread_id, *slot.lock())))
            .collect()
    }

    /// The statistics of all threads combined.
    #[must_use]
    pub fn merged_statistics(&self) -> Statistics {
        let mut merged = Statistics::new(self.config);

        for slot in self.per_thread.read().iter().flatten() {
            merged.merge_from(&slot.lock());
        }

        merged
    }
}

/// A cheaply cloneable reference to an [`EventRecord`] in a [`Registry`][crate::Registry].
///
/// Handles compare equal only if they refer to the same record.
#[derive(Clone, Debug)]
pub struct EventHandle {
    record: Arc<EventRecord>,
}

impl EventHandle {
    pub(crate) fn new(record: EventRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }
}

impl Deref for EventHandle {
    type Target = EventRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl PartialEq for EventHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl Eq for EventHandle {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(EventRecord: Send, Sync);
    assert_impl_all!(EventHandle: Send, Sync, Clone);

    fn record(name: &str) -> EventRecord {
        EventRecord::new(
            Arc::from(name),
            0,
            EventKind::Plain,
            StatisticsConfig::all(),
            false,
        )
    }

    #[test]
    fn unobserved_thread_has_no_statistics() {
        let record = record("idle");

        assert!(record.statistics(0).is_none());
        assert!(record.statistics(100).is_none());
        assert!(record.thread_statistics().is_empty());
        assert_eq!(record.merged_statistics().count(), 0);
    }

    #[test]
    fn slots_are_allocated_per_thread() {
        let record = record("sparse");

        record.with_thread_statistics(3, |stats| stats.record(1.0, 1, None));
        record.with_thread_statistics(3, |stats| stats.record(2.0, 1, None));
        record.with_thread_statistics(0, |stats| stats.record(5.0, 1, None));

        assert_eq!(record.statistics(3).unwrap().count(), 2);
        assert_eq!(record.statistics(0).unwrap().count(), 1);
        assert!(record.statistics(1).is_none());

        let threads = record
            .thread_statistics()
            .into_iter()
            .map(|(thread_id, _)| thread_id)
            .collect::<Vec<_>>();
        assert_eq!(threads, vec![0, 3]);

        assert_eq!(record.merged_statistics().count(), 3);
    }

    #[test]
    fn concurrent_threads_do_not_lose_observations() {
        const THREADS: usize = 8;
        const OBSERVATIONS: u64 = 1000;

        let record = record("contended");

        thread::scope(|s| {
            for thread_id in 0..THREADS {
                let record = &record;
                s.spawn(move || {
                    for _ in 0..OBSERVATIONS {
                        record.with_thread_statistics(thread_id, |stats| {
                            stats.record(1.0, 1, None);
                        });
                    }
                });
            }
        });

        for thread_id in 0..THREADS {
            assert_eq!(record.statistics(thread_id).unwrap().count(), OBSERVATIONS);
        }

        assert_eq!(
            record.merged_statistics().count(),
            OBSERVATIONS * THREADS as u64
        );
    }

    #[test]
    fn handles_compare_by_identity() {
        let first = EventHandle::new(record("same"));
        let second = EventHandle::new(record("same"));

        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }

    #[test]
    fn kind_reports_monotonic() {
        let record = EventRecord::new(
            Arc::from("bytes_total"),
            4,
            EventKind::Monotonic,
            StatisticsConfig::all(),
            true,
        );

        assert!(record.is_monotonic());
        assert_eq!(record.local_id(), 4);
        assert_eq!(record.name(), "bytes_total");
        assert_eq!(record.kind().to_string(), "monotonic");
    }
}
