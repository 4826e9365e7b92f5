use std::fmt::{self, Display};

/// The position of a rank in a [`BinomialTree`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Role {
    /// Rank 0. Has no parent and produces the global result.
    Root,

    /// Has both a parent and at least one child.
    Internal,

    /// Has a parent but no children.
    Leaf,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Internal => write!(f, "internal"),
            Self::Leaf => write!(f, "leaf"),
        }
    }
}

/// One communication step of a rank in a tree phase.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Step {
    /// Wait for a message from the given rank.
    ReceiveFrom(usize),

    /// Send a message to the given rank.
    SendTo(usize),
}

/// The shape of the binomial tree over `size` ranks, seen from one rank.
///
/// The tree is implicit in the binary representation of rank numbers. Scanning bit masks
/// upward from 1, a rank whose bit under the mask is clear adopts `rank | mask` as a child
/// (if that rank exists); the first set bit `mask` makes `rank & !mask` the parent and ends
/// the scan. Rank 0 is the root. The depth of a rank is the number of set bits in it, so the
/// height of the tree is at most `ceil(log2(size))`.
///
/// For 8 ranks:
///
/// ```text
/// 0 ─┬─ 1
///    ├─ 2 ─── 3
///    └─ 4 ─┬─ 5
///          └─ 6 ─── 7
/// ```
///
/// During a reduction a rank receives from its children in ascending mask order and then
/// sends to its parent. During a broadcast it receives from its parent and then sends to its
/// children in descending mask order, so that the largest subtrees get their data first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BinomialTree {
    rank: usize,
    size: usize,
}

impl BinomialTree {
    /// Describes the tree over `size` ranks from the perspective of `rank`.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is not less than `size`.
    #[must_use]
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(
            rank < size,
            "rank {rank} is outside of a group of {size} ranks"
        );

        Self { rank, size }
    }

    /// The rank this tree is seen from.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The number of ranks in the tree.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The parent of this rank, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.masks()
            .find(|mask| self.rank & mask != 0)
            .map(|mask| self.rank & !mask)
    }

    /// The children of this rank, in ascending mask order.
    #[must_use]
    pub fn children(&self) -> Vec<usize> {
        self.masks()
            .take_while(|mask| self.rank & mask == 0)
            .map(|mask| self.rank | mask)
            .filter(|&child| child < self.size)
            .collect()
    }

    /// The position of this rank in the tree.
    #[must_use]
    pub fn role(&self) -> Role {
        if self.rank == 0 {
            Role::Root
        } else if self.children().is_empty() {
            Role::Leaf
        } else {
            Role::Internal
        }
    }

    /// Every rank this rank ever communicates with: its parent (if any) and its children.
    #[must_use]
    pub fn neighbors(&self) -> Vec<usize> {
        self.parent().into_iter().chain(self.children()).collect()
    }

    /// The steps of this rank while data flows from the leaves to the root.
    #[must_use]
    pub fn reduce_steps(&self) -> Vec<Step> {
        self.children()
            .into_iter()
            .map(Step::ReceiveFrom)
            .chain(self.parent().map(Step::SendTo))
            .collect()
    }

    /// The steps of this rank while data flows from the root to the leaves.
    #[must_use]
    pub fn broadcast_steps(&self) -> Vec<Step> {
        self.parent()
            .map(Step::ReceiveFrom)
            .into_iter()
            .chain(self.children().into_iter().rev().map(Step::SendTo))
            .collect()
    }

    /// Powers of two below the group size, ascending.
    fn masks(&self) -> impl Iterator<Item = usize> {
        let size = self.size;

        (0..usize::BITS)
            .map(|shift| 1_usize << shift)
            .take_while(move |&mask| mask < size)
    }
}
