use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::num::NonZero;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::{EventHandle, EventRecord};

/// Keys of typical depth fit inline without a heap allocation.
const INLINE_KEY_LEN: usize = 8;

/// Identifies the call path through which a base event was reached.
///
/// The key is an owned sequence of integers:
///
/// 1. The number of enclosing frames that were considered.
/// 2. The identity (local id) of each considered frame, outermost first.
/// 3. The identity (local id) of the base event.
///
/// Two observations resolve to the same context event if and only if their keys are equal
/// element by element. Keys are ordered first by length and then element by element.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ContextKey {
    elements: SmallVec<[u64; INLINE_KEY_LEN]>,
}

impl ContextKey {
    /// Builds a key from the identities of the considered frames and of the base event.
    #[must_use]
    pub fn new(frames: impl ExactSizeIterator<Item = u64>, base: u64) -> Self {
        let mut elements = SmallVec::with_capacity(frames.len().saturating_add(2));

        elements.push(frames.len() as u64);
        elements.extend(frames);
        elements.push(base);

        Self { elements }
    }

    /// The number of enclosing frames that the key distinguishes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames().len()
    }

    /// The identities of the considered frames, outermost first.
    #[must_use]
    pub fn frames(&self) -> &[u64] {
        let len = self.elements.len();

        self.elements
            .get(1..len.saturating_sub(1))
            .expect("a key always holds its length and base event")
    }

    /// The identity of the base event.
    #[must_use]
    pub fn base(&self) -> u64 {
        *self
            .elements
            .last()
            .expect("a key always holds its base event")
    }

    /// The raw elements of the key, including the leading frame count.
    #[must_use]
    pub fn elements(&self) -> &[u64] {
        &self.elements
    }
}

impl Ord for ContextKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.elements
            .len()
            .cmp(&other.elements.len())
            .then_with(|| self.elements.as_slice().cmp(other.elements.as_slice()))
    }
}

impl PartialOrd for ContextKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Derives context keys and memoizes the context event of every distinct call path.
#[derive(Debug)]
pub(crate) struct CallpathKeyer {
    depth: NonZero<usize>,

    resolved: RwLock<BTreeMap<ContextKey, EventHandle>>,
}

impl CallpathKeyer {
    pub(crate) fn new(depth: NonZero<usize>) -> Self {
        Self {
            depth,
            resolved: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn depth(&self) -> NonZero<usize> {
        self.depth
    }

    /// Keys `event` by up to `depth` of the innermost frames of `stack` (outermost first).
    pub(crate) fn key_for(&self, event: &EventRecord, stack: &[EventHandle]) -> ContextKey {
        ContextKey::new(
            innermost(stack, self.depth.get())
                .iter()
                .map(|frame| frame.local_id() as u64),
            event.local_id() as u64,
        )
    }

    /// Returns the context event memoized for `key`, calling `create` to make one on a miss.
    ///
    /// `create` runs while the memo is locked, so each key is only ever created once.
    pub(crate) fn resolve(
        &self,
        key: &ContextKey,
        create: impl FnOnce() -> EventHandle,
    ) -> EventHandle {
        if let Some(existing) = self.resolved.read().get(key) {
            return existing.clone();
        }

        self.resolved
            .write()
            .entry(key.clone())
            .or_insert_with(create)
            .clone()
    }

    /// Renders the call path identified by `key` as `"caller => ... => event"`.
    pub(crate) fn render(key: &ContextKey, event: &EventRecord, stack: &[EventHandle]) -> String {
        let mut name = String::new();

        for frame in innermost(stack, key.depth()) {
            write!(name, "{} => ", frame.name()).expect("writing to a String cannot fail");
        }

        name.push_str(event.shared_name());
        name
    }
}

/// The last `depth` frames of `stack`, or all of them if there are fewer.
fn innermost(stack: &[EventHandle], depth: usize) -> &[EventHandle] {
    let start = stack.len().saturating_sub(depth);

    stack.get(start..).unwrap_or_default()
}
