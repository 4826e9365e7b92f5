//! Encoding of the messages exchanged during unification.
//!
//! Every message is a frame: one byte identifying the [`MessageKind`], followed by a payload
//! whose layout depends on the kind. All integers are little-endian `u32`.
//!
//! | Kind      | Payload                                                        |
//! |-----------|----------------------------------------------------------------|
//! | `Request` | empty                                                          |
//! | `Table`   | name count, then for each name: byte length, UTF-8 bytes       |
//! | `Mapping` | global name count, entry count, then each entry (a global id)  |
//! | `Ack`     | empty                                                          |
//! | `Commit`  | empty                                                          |
//! | `Abort`   | empty                                                          |
//!
//! Names in a table are unique and in strictly ascending byte order. Decoders verify every
//! structural property because a corrupt table would otherwise silently produce wrong ids.

use std::ops::Range;

use crate::{Error, Result};

const U32_LEN: usize = size_of::<u32>();

/// Length of the frame header that precedes every payload.
pub(crate) const FRAME_HEADER_LEN: usize = 1;

/// The kind of a unification protocol message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum MessageKind {
    /// A parent asks a child for its table.
    Request,

    /// A name table travelling up the tree.
    Table,

    /// A mapping array travelling down the tree.
    Mapping,

    /// A subtree confirms that it has applied its mappings.
    Ack,

    /// The root confirms that every rank has applied its mapping.
    Commit,

    /// The sender failed or learned of a failure; the run is abandoned.
    Abort,
}

impl MessageKind {
    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Table => 2,
            Self::Mapping => 3,
            Self::Ack => 4,
            Self::Commit => 5,
            Self::Abort => 6,
        }
    }

    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Request),
            2 => Some(Self::Table),
            3 => Some(Self::Mapping),
            4 => Some(Self::Ack),
            5 => Some(Self::Commit),
            6 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// A frame that carries no payload.
pub(crate) fn empty_frame(kind: MessageKind) -> Vec<u8> {
    vec![kind.to_byte()]
}

/// Encodes a name table frame. The names must already be unique and ascending.
pub(crate) fn table_frame<'a>(names: impl ExactSizeIterator<Item = &'a [u8]>) -> Result<Vec<u8>> {
    let mut frame = vec![MessageKind::Table.to_byte()];
    write_table(&mut frame, names)?;
    Ok(frame)
}

/// Appends a count-prefixed sequence of length-prefixed names to `out`.
pub(crate) fn write_table<'a>(
    out: &mut Vec<u8>,
    names: impl ExactSizeIterator<Item = &'a [u8]>,
) -> Result<()> {
    write_u32(out, names.len(), "name count")?;

    for name in names {
        write_u32(out, name.len(), "name length")?;
        out.extend_from_slice(name);
    }

    Ok(())
}

/// Encodes a mapping frame.
#[expect(
    clippy::arithmetic_side_effects,
    reason = "the capacity is only a hint and the ids already occupy memory of that scale"
)]
pub(crate) fn mapping_frame(global_count: usize, global_ids: &[usize]) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(
        FRAME_HEADER_LEN + U32_LEN * 2 + U32_LEN * global_ids.len(),
    );

    frame.push(MessageKind::Mapping.to_byte());
    write_u32(&mut frame, global_count, "global name count")?;
    write_u32(&mut frame, global_ids.len(), "mapping length")?;

    for &id in global_ids {
        write_u32(&mut frame, id, "global id")?;
    }

    Ok(frame)
}

/// Checks that `frame` is of the `expected` kind and returns its payload.
///
/// An `Abort` frame is reported as [`Error::Aborted`] whatever was expected.
pub(crate) fn open_frame(frame: &[u8], expected: MessageKind, rank: usize) -> Result<&[u8]> {
    let (&kind_byte, payload) = frame.split_first().ok_or_else(|| Error::MalformedFrame {
        rank,
        problem: "empty frame".to_string(),
    })?;

    let kind = MessageKind::from_byte(kind_byte).ok_or_else(|| Error::MalformedFrame {
        rank,
        problem: format!("unknown message kind {kind_byte}"),
    })?;

    if kind == MessageKind::Abort {
        return Err(Error::Aborted { rank });
    }

    if kind != expected {
        return Err(Error::UnexpectedMessage {
            rank,
            expected,
            actual: kind,
        });
    }

    Ok(payload)
}

/// Validates a table payload and returns the byte range of each name within `payload`,
/// shifted by `offset`.
#[expect(
    clippy::arithmetic_side_effects,
    reason = "spans lie within a payload that fits in memory"
)]
pub(crate) fn decode_table(payload: &[u8], offset: usize, rank: usize) -> Result<Vec<Range<usize>>> {
    let malformed = |problem: String| Error::MalformedTable { rank, problem };

    let mut reader = Reader::new(payload);

    let count = reader
        .read_u32()
        .ok_or_else(|| malformed("missing name count".to_string()))?;

    // Each name needs at least its length prefix, which bounds a plausible count.
    if count
        .checked_mul(U32_LEN)
        .is_none_or(|prefixes| prefixes > reader.remaining())
    {
        return Err(malformed(format!(
            "name count {count} exceeds what {} bytes can hold",
            reader.remaining()
        )));
    }

    let mut spans = Vec::with_capacity(count);
    let mut previous: Option<&[u8]> = None;

    for index in 0..count {
        let len = reader
            .read_u32()
            .ok_or_else(|| malformed(format!("missing length of name {index}")))?;

        let start = reader.position();
        let name = reader
            .take(len)
            .ok_or_else(|| malformed(format!("name {index} overruns the table")))?;

        if std::str::from_utf8(name).is_err() {
            return Err(malformed(format!("name {index} is not valid UTF-8")));
        }

        if previous.is_some_and(|previous| previous >= name) {
            return Err(malformed(format!(
                "name {index} is not in strictly ascending order"
            )));
        }

        previous = Some(name);
        spans.push(offset + start..offset + start + len);
    }

    if reader.remaining() != 0 {
        return Err(malformed(format!(
            "{} trailing bytes after the last name",
            reader.remaining()
        )));
    }

    Ok(spans)
}

/// Validates a mapping payload that must hold exactly `expected_len` entries, returning
/// the global name count and the entries.
#[expect(
    clippy::arithmetic_side_effects,
    reason = "the entry count comes from a u32 and cannot overflow when multiplied by 4"
)]
pub(crate) fn decode_mapping(
    payload: &[u8],
    expected_len: usize,
    rank: usize,
) -> Result<(usize, Vec<usize>)> {
    let malformed = |problem: String| Error::MalformedMapping { rank, problem };

    let mut reader = Reader::new(payload);

    let global_count = reader
        .read_u32()
        .ok_or_else(|| malformed("missing global name count".to_string()))?;
    let len = reader
        .read_u32()
        .ok_or_else(|| malformed("missing entry count".to_string()))?;

    if len != expected_len {
        return Err(malformed(format!(
            "expected {expected_len} entries but the mapping holds {len}"
        )));
    }

    if reader.remaining() != len * U32_LEN {
        return Err(malformed(format!(
            "{len} entries do not fit {} payload bytes",
            reader.remaining()
        )));
    }

    let mut ids = Vec::with_capacity(len);

    for index in 0..len {
        let id = reader
            .read_u32()
            .ok_or_else(|| malformed(format!("missing entry {index}")))?;

        if id >= global_count {
            return Err(malformed(format!(
                "entry {index} refers to global id {id} of only {global_count}"
            )));
        }

        ids.push(id);
    }

    Ok((global_count, ids))
}

fn write_u32(out: &mut Vec<u8>, value: usize, what: &'static str) -> Result<()> {
    let value = u32::try_from(value).ok().ok_or(Error::TooLarge { what })?;
    out.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Sequential reader over a payload. Every read returns `None` if the payload is too short.
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let taken = self.bytes.get(self.position..end)?;
        self.position = end;
        Some(taken)
    }

    fn read_u32(&mut self) -> Option<usize> {
        let bytes = self.take(U32_LEN)?;
        let value = u32::from_le_bytes(bytes.try_into().ok()?);
        usize::try_from(value).ok()
    }
}
