use std::fmt::{self, Display};
use std::sync::Arc;

use crate::{EventKind, NamespaceId, Registry, Statistics};

/// A human- and machine-readable summary of every event in a [`Registry`].
///
/// For human-readable output, use the `Display` trait implementation. For machine-readable
/// output, inspect report contents via the provided methods.
///
/// # Example
///
/// ```
/// use concord::Registry;
///
/// let registry = Registry::new();
/// let latency = registry.register_event("latency_ms");
///
/// registry.trigger_event(&latency, 4);
/// registry.trigger_event(&latency, 6);
///
/// let report = registry.report();
/// let summary = report.event("latency_ms").unwrap();
///
/// assert_eq!(summary.statistics().count(), 2);
/// assert_eq!(summary.statistics().mean(), Some(5.0));
///
/// println!("{report}");
/// ```
#[derive(Debug)]
pub struct Report {
    namespace: NamespaceId,

    // Sorted by event name, ascending.
    events: Box<[EventSummary]>,
}

impl Report {
    pub(crate) fn collect(registry: &Registry) -> Self {
        let mut events = registry
            .snapshot()
            .iter()
            .map(|event| EventSummary {
                name: Arc::clone(event.shared_name()),
                local_id: event.local_id(),
                kind: event.kind(),
                thread_count: event.thread_statistics().len(),
                statistics: event.merged_statistics(),
            })
            .collect::<Vec<_>>();

        events.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            namespace: registry.namespace(),
            events: events.into_boxed_slice(),
        }
    }

    /// The namespace of the registry the report was collected from.
    #[must_use]
    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// Iterates through all the events in the report, in ascending order of name.
    pub fn events(&self) -> impl Iterator<Item = &EventSummary> {
        self.events.iter()
    }

    /// The summary of the event called `name`, if the registry held one.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventSummary> {
        self.events
            .binary_search_by(|summary| (*summary.name).cmp(name))
            .ok()
            .and_then(|index| self.events.get(index))
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.namespace)?;

        for event in &self.events {
            writeln!(f, "{event}")?;
        }

        Ok(())
    }
}

/// The statistics of one event, combined across all threads that observed it.
///
/// Part of a collected [`Report`].
#[derive(Debug)]
pub struct EventSummary {
    name: Arc<str>,
    local_id: usize,
    kind: EventKind,
    thread_count: usize,
    statistics: Statistics,
}

impl EventSummary {
    /// The name of the event.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The local id of the event in its registry.
    #[must_use]
    pub fn local_id(&self) -> usize {
        self.local_id
    }

    /// The kind of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The number of threads that observed the event at least once.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// The statistics of all threads combined.
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

impl Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;

        let count = self.statistics.count();

        if count == 0 {
            return write!(f, "0");
        }

        write!(f, "{count}")?;

        if let Some(min) = self.statistics.min() {
            write!(f, "; min {min}")?;
        }

        if let Some(max) = self.statistics.max() {
            write!(f, "; max {max}")?;
        }

        if let Some(mean) = self.statistics.mean() {
            write!(f, "; mean {mean}")?;
        }

        if let Some(stddev) = self.statistics.stddev() {
            write!(f, "; stddev {stddev}")?;
        }

        if self.kind != EventKind::Plain {
            write!(f, " ({})", self.kind)?;
        }

        Ok(())
    }
}
