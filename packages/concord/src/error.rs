use thiserror::Error;

use crate::MessageKind;

/// Errors that can occur while unifying event tables across ranks.
///
/// Every error in this type is fatal for the unification run that produced it. When one rank
/// fails, it informs its peers and every participating rank fails the same run, so no rank
/// ever holds a mapping that is inconsistent with its peers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A message received from another rank was not a recognizable protocol frame.
    #[error("malformed frame received from rank {rank}: {problem}")]
    MalformedFrame {
        /// The rank that sent the frame.
        rank: usize,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A name table received from another rank did not pass validation.
    #[error("malformed name table received from rank {rank}: {problem}")]
    MalformedTable {
        /// The rank that sent the table.
        rank: usize,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A mapping array received from another rank did not pass validation.
    #[error("malformed mapping received from rank {rank}: {problem}")]
    MalformedMapping {
        /// The rank that sent the mapping.
        rank: usize,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A protocol message of an unexpected kind arrived from a peer.
    #[error("expected {expected:?} from rank {rank} but received {actual:?}")]
    UnexpectedMessage {
        /// The rank that sent the message.
        rank: usize,

        /// The kind of message the protocol was waiting for.
        expected: MessageKind,

        /// The kind of message that actually arrived.
        actual: MessageKind,
    },

    /// A peer reported that the unification run failed.
    #[error("unification aborted by rank {rank}")]
    Aborted {
        /// The rank from which the abort notification was received.
        rank: usize,
    },

    /// The transport can no longer reach a peer.
    #[error("rank {rank} is no longer reachable")]
    Disconnected {
        /// The unreachable rank.
        rank: usize,
    },

    /// A transport operation referenced a rank that does not exist.
    #[error("rank {rank} does not exist in a group of {rank_count} ranks")]
    InvalidRank {
        /// The rank that was referenced.
        rank: usize,

        /// The number of ranks in the group.
        rank_count: usize,
    },

    /// A value was too large to be represented in the wire format.
    #[error("{what} does not fit into the wire format")]
    TooLarge {
        /// What was being encoded.
        what: &'static str,
    },
}

/// A specialized `Result` type for unification operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
