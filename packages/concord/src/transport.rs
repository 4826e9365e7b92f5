use std::fmt::{self, Debug, Display};

use crate::{NamespaceId, Result};

/// Distinguishes independent message streams between the same pair of ranks.
///
/// Unification of each namespace uses its own tag, so messages of different namespaces can
/// never be confused even if they are in flight at the same time.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag(u32);

impl Tag {
    /// Creates a tag from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The tag used to unify the events of `namespace`.
    #[must_use]
    #[expect(clippy::cast_lossless, reason = "u32::from is not const")]
    pub const fn for_namespace(namespace: NamespaceId) -> Self {
        Self(namespace.get() as u32)
    }

    /// The raw value of the tag.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag {}", self.0)
    }
}

/// Point-to-point messaging between a fixed group of ranks.
///
/// Each participating rank owns one transport endpoint. Messages from one source with one
/// tag are delivered in the order they were sent. Messages with other tags, or from other
/// sources, do not interfere with each other.
///
/// Unification only ever drives a transport from one thread per rank at a time.
pub trait Transport: Debug {
    /// The rank of this endpoint, in `0..rank_count()`.
    fn rank(&self) -> usize;

    /// The number of ranks in the group. Always at least 1.
    fn rank_count(&self) -> usize;

    /// Sends `payload` to `destination`, tagged with `tag`.
    ///
    /// Sending does not wait for the destination to receive the message.
    ///
    /// # Errors
    ///
    /// Returns an error if `destination` does not exist or can no longer be reached.
    fn send(&self, destination: usize, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Waits for the next message from `source` tagged with `tag` and returns its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` does not exist or can no longer be reached.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Waits until every rank in the group has entered the barrier.
    ///
    /// # Errors
    ///
    /// Returns an error if the group can no longer synchronize.
    fn barrier(&self) -> Result<()>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn namespaces_have_distinct_tags() {
        assert_ne!(
            Tag::for_namespace(NamespaceId::FUNCTIONS),
            Tag::for_namespace(NamespaceId::COUNTERS)
        );
        assert_eq!(Tag::for_namespace(NamespaceId::new(42)).get(), 42);
    }

    #[test]
    fn display_shows_value() {
        assert_eq!(Tag::new(9).to_string(), "tag 9");
    }
}
