use std::sync::Arc;

use crate::{EventHandle, Registry, Result, wire};

/// The event names of one registry in ascending byte order, together with the permutation
/// that relates them back to local ids.
///
/// This is what a rank contributes to unification. The names are unique because a registry
/// never holds two events of the same name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SortedTable {
    names: Vec<Arc<str>>,

    /// Indexed by local id, holds the position of that event's name in `names`.
    sort_map: Vec<usize>,
}

impl SortedTable {
    /// Captures the names of every event currently registered in `registry`.
    ///
    /// Events registered after this call are not part of the table.
    #[must_use]
    pub fn from_registry(registry: &Registry) -> Self {
        Self::from_events(&registry.snapshot())
    }

    /// Sorts the names of `events`, which must hold every local id of one registry exactly once,
    /// in any order.
    pub(crate) fn from_events(events: &[EventHandle]) -> Self {
        let mut by_name = events
            .iter()
            .map(|event| (Arc::clone(event.shared_name()), event.local_id()))
            .collect::<Vec<_>>();

        // `str` ordering is byte-wise, independent of locale.
        by_name.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

        let mut sort_map = vec![0; by_name.len()];
        let mut names = Vec::with_capacity(by_name.len());

        for (position, (name, local_id)) in by_name.into_iter().enumerate() {
            *sort_map
                .get_mut(local_id)
                .expect("local ids are dense and below the event count") = position;
            names.push(name);
        }

        Self { names, sort_map }
    }

    /// The names in ascending byte order.
    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    /// Indexed by local id, the position of each event's name in [`names()`][Self::names].
    #[must_use]
    pub fn sort_map(&self) -> &[usize] {
        &self.sort_map
    }

    /// The number of names in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table holds no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Serializes the table as a count-prefixed sequence of length-prefixed UTF-8 names,
    /// with every integer a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooLarge`][crate::Error::TooLarge] if the table holds more names,
    /// or a longer name, than the format can describe.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        wire::write_table(&mut out, self.names.iter().map(|name| name.as_bytes()))?;
        Ok(out)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

    use super::*;

    fn names(table: &SortedTable) -> Vec<&str> {
        table.names().iter().map(AsRef::as_ref).collect()
    }

    #[test]
    fn names_are_sorted_and_permutation_inverts() {
        let registry = Registry::new();
        registry.register_event("zeta");
        registry.register_event("alpha");
        registry.register_event("mu");

        let table = SortedTable::from_registry(&registry);

        assert_eq!(names(&table), ["alpha", "mu", "zeta"]);
        assert_eq!(table.sort_map(), [2, 0, 1]);

        for event in registry.snapshot() {
            let position = table.sort_map()[event.local_id()];
            assert_eq!(&*table.names()[position], event.name());
        }
    }

    #[test]
    fn event_order_does_not_change_sort_map() {
        let registry = Registry::new();
        registry.register_event("zeta");
        registry.register_event("alpha");
        registry.register_event("mu");

        let mut events = registry.snapshot();
        events.reverse();

        let table = SortedTable::from_events(&events);

        assert_eq!(table, SortedTable::from_registry(&registry));
        assert_eq!(table.sort_map(), [2, 0, 1]);
    }

    #[test]
    fn ordering_is_by_bytes() {
        let registry = Registry::new();
        registry.register_event("b");
        registry.register_event("B");
        registry.register_event("a");
        registry.register_event("ä");

        let table = SortedTable::from_registry(&registry);

        assert_eq!(names(&table), ["B", "a", "b", "ä"]);
    }

    #[test]
    fn empty_registry_gives_empty_table() {
        let table = SortedTable::from_registry(&Registry::new());

        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.encode().unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn encode_writes_count_then_names() {
        let registry = Registry::new();
        registry.register_event("xy");
        registry.register_event("a");

        let encoded = SortedTable::from_registry(&registry).encode().unwrap();

        assert_eq!(
            encoded,
            [2, 0, 0, 0, 1, 0, 0, 0, b'a', 2, 0, 0, 0, b'x', b'y']
        );
    }
}
