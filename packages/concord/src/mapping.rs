use crate::NamespaceId;

/// The outcome of unifying one namespace, as seen by one rank.
///
/// Relates every local id of the rank's registry to a global id that is the same on every
/// rank for the same event name. Global ids are dense in `0..global_count()` and follow the
/// ascending byte order of the names.
///
/// # Example
///
/// ```
/// use concord::{LocalTransport, Registry, Transport, unify};
///
/// let mappings = LocalTransport::run_ranks(2, |transport| {
///     let registry = Registry::new();
///
///     // Each rank registers a different subset of events, in a different order.
///     if transport.rank() == 0 {
///         registry.register_event("read");
///         registry.register_event("compute");
///     } else {
///         registry.register_event("write");
///         registry.register_event("read");
///     }
///
///     unify(&registry, transport).unwrap()
/// });
///
/// // "read" is local id 0 on rank 0 and local id 1 on rank 1, but has one global id.
/// assert_eq!(mappings[0].global_id(0), mappings[1].global_id(1));
/// assert_eq!(mappings[0].global_count(), 3);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalMapping {
    namespace: NamespaceId,
    rank: usize,
    local_to_global: Vec<usize>,
    global_count: usize,
    global_names: Option<Vec<String>>,
}

impl GlobalMapping {
    pub(crate) fn new(
        namespace: NamespaceId,
        rank: usize,
        local_to_global: Vec<usize>,
        global_count: usize,
        global_names: Option<Vec<String>>,
    ) -> Self {
        debug_assert!(local_to_global.iter().all(|&id| id < global_count));

        Self {
            namespace,
            rank,
            local_to_global,
            global_count,
            global_names,
        }
    }

    /// The namespace that was unified.
    #[must_use]
    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// The rank this mapping belongs to.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of distinct event names across all ranks.
    #[must_use]
    pub fn global_count(&self) -> usize {
        self.global_count
    }

    /// The number of local events covered by the mapping.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.local_to_global.len()
    }

    /// The global id of every local event, indexed by local id.
    #[must_use]
    pub fn local_to_global(&self) -> &[usize] {
        &self.local_to_global
    }

    /// The global id of the local event `local_id`, or `None` if the event was registered
    /// after the table of this rank was captured.
    #[must_use]
    pub fn global_id(&self, local_id: usize) -> Option<usize> {
        self.local_to_global.get(local_id).copied()
    }

    /// On the root rank, the name of every global id in ascending order. `None` elsewhere.
    #[must_use]
    pub fn global_names(&self) -> Option<&[String]> {
        self.global_names.as_deref()
    }

    /// Scatters values indexed by local id into a vector indexed by global id.
    ///
    /// Global ids of events this rank never registered hold `None`. Values beyond the local
    /// events covered by the mapping are ignored.
    #[must_use]
    pub fn to_global<T: Clone>(&self, local: &[T]) -> Vec<Option<T>> {
        let mut global = vec![None; self.global_count];

        for (value, &global_id) in local.iter().zip(&self.local_to_global) {
            if let Some(slot) = global.get_mut(global_id) {
                *slot = Some(value.clone());
            }
        }

        global
    }
}
