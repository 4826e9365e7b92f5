//! N-way merging of sorted name tables.
//!
//! Each rank merges its own table with the tables received from its children. Every input is
//! wrapped in a [`UnifyObject`] that remembers, for each of its names, where that name ended
//! up in the merged output. Once the parent answers with the final global id of every merged
//! name, the per-input mappings are rewritten from merged positions to global ids and passed
//! further down.

use std::ops::Range;

use smallvec::SmallVec;

use crate::{Result, SortedTable, wire};

/// A sorted name table taking part in a merge, plus the mapping of its names to positions in
/// the merged output.
#[derive(Debug)]
pub(crate) struct UnifyObject {
    /// The rank that contributed the table.
    rank: usize,

    buffer: Vec<u8>,

    /// Byte range of each name within `buffer`, in ascending name order.
    spans: Vec<Range<usize>>,

    /// Indexed like `spans`. Filled by the merge, later rewritten to global ids.
    mapping: Vec<usize>,

    /// Index of the next name the merge has not yet consumed.
    cursor: usize,
}

impl UnifyObject {
    /// Wraps a table frame received from `rank`, validating it.
    pub(crate) fn from_frame(rank: usize, frame: Vec<u8>) -> Result<Self> {
        let payload = wire::open_frame(&frame, wire::MessageKind::Table, rank)?;
        let spans = wire::decode_table(payload, wire::FRAME_HEADER_LEN, rank)?;

        Ok(Self::new(rank, frame, spans))
    }

    /// Wraps the table of the local rank.
    pub(crate) fn from_table(rank: usize, table: &SortedTable) -> Self {
        let mut buffer = Vec::with_capacity(table.names().iter().map(|name| name.len()).sum());
        let mut spans = Vec::with_capacity(table.len());

        for name in table.names() {
            let start = buffer.len();
            buffer.extend_from_slice(name.as_bytes());
            spans.push(start..buffer.len());
        }

        Self::new(rank, buffer, spans)
    }

    fn new(rank: usize, buffer: Vec<u8>, spans: Vec<Range<usize>>) -> Self {
        Self {
            rank,
            mapping: vec![0; spans.len()],
            buffer,
            spans,
            cursor: 0,
        }
    }

    pub(crate) fn rank(&self) -> usize {
        self.rank
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }

    /// The mapping of each name of this table, indexed in ascending name order.
    pub(crate) fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    /// The name at `index` in ascending order.
    pub(crate) fn name(&self, index: usize) -> &[u8] {
        self.spans
            .get(index)
            .and_then(|span| self.buffer.get(span.clone()))
            .expect("spans are validated to lie within the buffer")
    }

    fn current(&self) -> Option<&[u8]> {
        (self.cursor < self.len()).then(|| self.name(self.cursor))
    }

    /// Records that the current name was merged into position `merged_index`.
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "the cursor never passes the table length"
    )]
    fn advance(&mut self, merged_index: usize) {
        *self
            .mapping
            .get_mut(self.cursor)
            .expect("only advanced while a current name exists") = merged_index;
        self.cursor += 1;
    }
}

/// The result of merging: the sorted union of the names of several [`UnifyObject`]s.
///
/// Each entry refers to the object and name index that first supplied the name, so merged
/// names are never copied out of the input buffers.
#[derive(Debug, Default)]
pub(crate) struct MergeObject {
    entries: Vec<(usize, usize)>,
}

impl MergeObject {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The merged names in ascending order.
    pub(crate) fn names<'a>(
        &'a self,
        objects: &'a [UnifyObject],
    ) -> impl ExactSizeIterator<Item = &'a [u8]> {
        self.entries.iter().map(move |&(object, index)| {
            objects
                .get(object)
                .expect("entries only refer to merged objects")
                .name(index)
        })
    }
}

/// Merges the names of `objects` into their sorted union, filling in the mapping of every
/// object so that each of its names points at the name's position in the union.
///
/// A name present in several objects appears once in the union and every object holding it
/// maps it to the same position.
pub(crate) fn merge_tables(objects: &mut [UnifyObject]) -> MergeObject {
    for object in objects.iter_mut() {
        object.cursor = 0;
    }

    if let [single] = objects {
        return merge_single(single);
    }

    let capacity = objects.iter().map(UnifyObject::len).max().unwrap_or_default();
    let mut merged = MergeObject {
        entries: Vec::with_capacity(capacity),
    };

    loop {
        // Objects whose current name equals the smallest current name, first one first.
        let mut ties: SmallVec<[usize; 8]> = SmallVec::new();
        let mut smallest: Option<&[u8]> = None;

        for (index, object) in objects.iter().enumerate() {
            let Some(name) = object.current() else {
                continue;
            };

            match smallest {
                Some(current) if name > current => {}
                Some(current) if name == current => ties.push(index),
                _ => {
                    smallest = Some(name);
                    ties.clear();
                    ties.push(index);
                }
            }
        }

        let Some(&owner) = ties.first() else {
            break;
        };

        let merged_index = merged.entries.len();
        merged.entries.push((owner, cursor_of(objects, owner)));

        for index in ties {
            objects
                .get_mut(index)
                .expect("ties are indexes of objects")
                .advance(merged_index);
        }
    }

    merged
}

fn cursor_of(objects: &[UnifyObject], index: usize) -> usize {
    objects
        .get(index)
        .expect("ties are indexes of objects")
        .cursor
}

/// A single table is already sorted and unique, so it maps onto itself.
fn merge_single(object: &mut UnifyObject) -> MergeObject {
    let entries = (0..object.len()).map(|index| (0, index)).collect();

    for (index, target) in object.mapping.iter_mut().enumerate() {
        *target = index;
    }
    object.cursor = object.len();

    MergeObject { entries }
}

/// Rewrites the mapping of every object from merged positions to the ids that `resolved`
/// assigns to those positions.
///
/// `resolved` must hold one entry per merged name.
pub(crate) fn compose_mappings(objects: &mut [UnifyObject], resolved: &[usize]) {
    for object in objects {
        for target in &mut object.mapping {
            *target = *resolved
                .get(*target)
                .expect("the resolved mapping covers every merged position");
        }
    }
}
