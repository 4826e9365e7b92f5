//! The collective protocol that assigns cross-rank event ids.
//!
//! Every rank runs the same sequence of phases over a [`BinomialTree`]:
//!
//! 1. **Reduce.** A rank asks each of its children (in ascending mask order) for its table,
//!    merges the received tables with its own and, unless it is the root, sends the merged
//!    table to its parent once the parent asks for it.
//! 2. **Broadcast.** The root assigns global ids to its merged names. Each rank receives from
//!    its parent the global id of every name it sent up, composes that into the mapping of
//!    each held table and sends every child the mapping of the table that child sent.
//! 3. **Confirm.** Acknowledgements travel up the tree once a whole subtree holds its mapping.
//! 4. **Commit.** The root, having heard from every rank, tells the tree to keep the result.
//!
//! A rank that fails at any point sends an abort notice to every tree neighbor that has not
//! already sent one to it. The notice floods the tree, every rank fails the run and no rank
//! returns a mapping unless every rank does.

use smallvec::SmallVec;
use tracing::{debug, error};

use crate::wire::{self, MessageKind};
use crate::{
    BinomialTree, Error, GlobalMapping, NamespaceId, Registry, Result, Role, SortedTable, Step,
    Tag, Transport, UnifyObject, compose_mappings, merge_tables,
};

/// Unifies the events of `registry` with the registries of the same namespace on every other
/// rank reachable through `transport`.
///
/// Every rank of the transport group must call this for the same namespace. The call waits
/// at a barrier first, then captures the event names registered at that moment.
///
/// # Errors
///
/// Returns an error if any rank fails the run, for example because it received a malformed
/// message or lost its connection to a peer. In that case no rank produces a mapping and the
/// transport must not be used to unify this namespace again.
///
/// # Example
///
/// ```
/// use concord::{LocalTransport, Registry, Transport, unify};
///
/// let mappings = LocalTransport::run_ranks(4, |transport| {
///     let registry = Registry::new();
///     registry.register_event(&format!("rank_{}", transport.rank()));
///     registry.register_event("shared");
///
///     unify(&registry, transport).unwrap()
/// });
///
/// for mapping in &mappings {
///     assert_eq!(mapping.global_count(), 5);
/// }
///
/// let names = mappings[0].global_names().unwrap();
/// assert_eq!(names, ["rank_0", "rank_1", "rank_2", "rank_3", "shared"]);
/// ```
pub fn unify<T>(registry: &Registry, transport: &T) -> Result<GlobalMapping>
where
    T: Transport + ?Sized,
{
    transport.barrier()?;

    let table = SortedTable::from_registry(registry);
    unify_table(registry.namespace(), &table, transport)
}

/// Unifies several registries, each holding a different namespace, one after another.
///
/// Every rank must pass registries of the same namespaces in the same order. Returns the
/// mappings in the order of `registries`.
///
/// # Errors
///
/// Stops at the first namespace whose unification fails and returns that error. Mappings of
/// namespaces unified before the failure are discarded.
pub fn unify_all<T>(registries: &[&Registry], transport: &T) -> Result<Vec<GlobalMapping>>
where
    T: Transport + ?Sized,
{
    debug_assert!(
        registries.iter().enumerate().all(|(index, registry)| {
            registries
                .iter()
                .skip(index.saturating_add(1))
                .all(|other| other.namespace() != registry.namespace())
        }),
        "each namespace may only be unified once per call"
    );

    registries
        .iter()
        .map(|registry| unify(registry, transport))
        .collect()
}

/// Unifies an already captured table of `namespace` across all ranks of `transport`.
///
/// This is the collective step behind [`unify()`], for callers that capture tables
/// themselves. No barrier is entered.
///
/// # Errors
///
/// Same as [`unify()`].
pub fn unify_table<T>(
    namespace: NamespaceId,
    table: &SortedTable,
    transport: &T,
) -> Result<GlobalMapping>
where
    T: Transport + ?Sized,
{
    let mut session = Session::new(namespace, transport);

    session.run(table).inspect_err(|error| session.abort(error))
}

/// The state of one rank during one unification run.
struct Session<'a, T: ?Sized> {
    namespace: NamespaceId,
    tag: Tag,
    transport: &'a T,
    tree: BinomialTree,

    /// Neighbors that told us the run failed, so do not need to hear it from us.
    aborted_neighbors: SmallVec<[usize; 8]>,
}

impl<'a, T> Session<'a, T>
where
    T: Transport + ?Sized,
{
    fn new(namespace: NamespaceId, transport: &'a T) -> Self {
        Self {
            namespace,
            tag: Tag::for_namespace(namespace),
            transport,
            tree: BinomialTree::new(transport.rank(), transport.rank_count()),
            aborted_neighbors: SmallVec::new(),
        }
    }

    fn run(&mut self, table: &SortedTable) -> Result<GlobalMapping> {
        let rank = self.tree.rank();

        debug!(
            namespace = %self.namespace,
            rank,
            role = %self.tree.role(),
            names = table.len(),
            "unification started"
        );

        // Reduce. The own table is always object 0, followed by one object per child.
        let mut objects = vec![UnifyObject::from_table(rank, table)];
        let mut merged = None;

        for step in self.tree.reduce_steps() {
            match step {
                Step::ReceiveFrom(child) => {
                    self.send(child, wire::empty_frame(MessageKind::Request))?;
                    let frame = self.receive(child, MessageKind::Table)?;
                    let object = UnifyObject::from_frame(child, frame)?;

                    debug!(namespace = %self.namespace, rank, child, names = object.len(), "received table");
                    objects.push(object);
                }
                Step::SendTo(parent) => {
                    let subtree = merge_tables(&mut objects);

                    self.receive(parent, MessageKind::Request)?;
                    self.send(parent, wire::table_frame(subtree.names(&objects))?)?;
                    merged = Some(subtree);
                }
            }
        }

        // The root has nobody to send to, so it merges after hearing from every child.
        let merged = merged.unwrap_or_else(|| merge_tables(&mut objects));

        debug!(namespace = %self.namespace, rank, merged = merged.len(), "merged tables");

        let global_names = (self.tree.role() == Role::Root).then(|| {
            merged
                .names(&objects)
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect::<Vec<_>>()
        });

        // Broadcast. The root numbers its merged names in order, which needs no composition.
        let mut global_count = merged.len();

        for step in self.tree.broadcast_steps() {
            match step {
                Step::ReceiveFrom(parent) => {
                    let frame = self.receive(parent, MessageKind::Mapping)?;
                    let payload = wire::open_frame(&frame, MessageKind::Mapping, parent)?;
                    let (count, resolved) = wire::decode_mapping(payload, merged.len(), parent)?;

                    compose_mappings(&mut objects, &resolved);
                    global_count = count;
                }
                Step::SendTo(child) => {
                    let object = objects
                        .iter()
                        .find(|object| object.rank() == child)
                        .expect("every child sent a table during the reduction");

                    self.send(child, wire::mapping_frame(global_count, object.mapping())?)?;
                }
            }
        }

        let own = objects.first().expect("the own table is always present");
        let local_to_global = table
            .sort_map()
            .iter()
            .map(|&position| {
                *own.mapping()
                    .get(position)
                    .expect("the sort map only holds positions of the own table")
            })
            .collect::<Vec<_>>();

        debug!(namespace = %self.namespace, rank, global_count, "mapping resolved");

        // Confirm.
        for step in self.tree.reduce_steps() {
            match step {
                Step::ReceiveFrom(child) => {
                    self.receive(child, MessageKind::Ack)?;
                }
                Step::SendTo(parent) => {
                    self.send(parent, wire::empty_frame(MessageKind::Ack))?;
                }
            }
        }

        // Commit. Once received from the parent, the run has succeeded on every rank.
        for step in self.tree.broadcast_steps() {
            match step {
                Step::ReceiveFrom(parent) => {
                    self.receive(parent, MessageKind::Commit)?;
                }
                Step::SendTo(child) => {
                    if let Err(error) = self.send(child, wire::empty_frame(MessageKind::Commit)) {
                        error!(
                            namespace = %self.namespace,
                            rank,
                            child,
                            %error,
                            "failed to forward commit"
                        );
                    }
                }
            }
        }

        debug!(namespace = %self.namespace, rank, "unification committed");

        Ok(GlobalMapping::new(
            self.namespace,
            rank,
            local_to_global,
            global_count,
            global_names,
        ))
    }

    fn send(&self, destination: usize, frame: Vec<u8>) -> Result<()> {
        self.transport.send(destination, self.tag, frame)
    }

    /// Receives the next frame from `source`, which must be of the `expected` kind.
    fn receive(&mut self, source: usize, expected: MessageKind) -> Result<Vec<u8>> {
        let frame = self.transport.recv(source, self.tag)?;

        if let Err(error) = wire::open_frame(&frame, expected, source).map(|_| ()) {
            if matches!(error, Error::Aborted { .. }) {
                self.aborted_neighbors.push(source);
            }

            return Err(error);
        }

        Ok(frame)
    }

    /// Tells every neighbor that has not already aborted that the run failed.
    fn abort(&self, cause: &Error) {
        error!(
            namespace = %self.namespace,
            rank = self.tree.rank(),
            error = %cause,
            "unification failed"
        );

        for neighbor in self.tree.neighbors() {
            if self.aborted_neighbors.contains(&neighbor) {
                continue;
            }

            // The neighbor may be gone already, in which case there is nobody left to tell.
            if let Err(error) = self.send(neighbor, wire::empty_frame(MessageKind::Abort)) {
                debug!(
                    namespace = %self.namespace,
                    rank = self.tree.rank(),
                    neighbor,
                    %error,
                    "could not deliver abort"
                );
            }
        }
    }
}
