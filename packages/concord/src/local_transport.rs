use std::collections::VecDeque;
use std::panic;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};
use std::thread;

use foldhash::HashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::{Error, Result, Tag, Transport};

/// An in-process [`Transport`] that connects a group of ranks running as threads.
///
/// Every ordered pair of ranks is connected by its own channel, so messages from one source
/// arrive in the order they were sent. Messages that arrive with a tag other than the one
/// being waited for are stashed until a matching receive.
///
/// # Example
///
/// ```
/// use concord::{LocalTransport, Tag, Transport};
///
/// let replies = LocalTransport::run_ranks(3, |transport| {
///     let tag = Tag::new(1);
///
///     if transport.rank() == 0 {
///         (1..transport.rank_count())
///             .map(|source| transport.recv(source, tag).unwrap())
///             .collect::<Vec<_>>()
///     } else {
///         transport.send(0, tag, vec![transport.rank() as u8]).unwrap();
///         Vec::new()
///     }
/// });
///
/// assert_eq!(replies[0], vec![vec![1], vec![2]]);
/// ```
#[derive(Debug)]
pub struct LocalTransport {
    rank: usize,

    /// Indexed by destination rank.
    senders: Vec<Sender<Envelope>>,

    inbox: Mutex<Inbox>,

    barrier: Arc<Barrier>,
}

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct Inbox {
    /// Indexed by source rank.
    receivers: Vec<Receiver<Envelope>>,

    /// Messages that arrived while a different tag was being waited for.
    stashed: HashMap<(usize, Tag), VecDeque<Vec<u8>>>,
}

impl LocalTransport {
    /// Creates the endpoints of a fully connected group of `rank_count` ranks.
    ///
    /// The endpoint at index `i` of the result has rank `i`.
    ///
    /// # Panics
    ///
    /// Panics if `rank_count` is zero.
    #[must_use]
    pub fn mesh(rank_count: usize) -> Vec<Self> {
        assert!(rank_count > 0, "a transport group needs at least one rank");

        let barrier = Arc::new(Barrier::new(rank_count));

        let mut senders = (0..rank_count)
            .map(|_| Vec::with_capacity(rank_count))
            .collect::<Vec<_>>();
        let mut receivers = (0..rank_count)
            .map(|_| Vec::with_capacity(rank_count))
            .collect::<Vec<_>>();

        // Channel (source, destination) is pushed in source order into the receivers of
        // `destination` and in destination order into the senders of `source`.
        for source_senders in &mut senders {
            for destination_receivers in &mut receivers {
                let (tx, rx) = mpsc::channel();
                source_senders.push(tx);
                destination_receivers.push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| Self {
                rank,
                senders,
                inbox: Mutex::new(Inbox {
                    receivers,
                    stashed: HashMap::default(),
                }),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    /// Runs `f` once per rank of a new group of `rank_count` ranks, each on its own thread,
    /// and returns the results in rank order.
    ///
    /// If any rank panics, the panic is resumed on the calling thread after all ranks end.
    ///
    /// # Panics
    ///
    /// Panics if `rank_count` is zero or if `f` panics on any rank.
    pub fn run_ranks<F, R>(rank_count: usize, f: F) -> Vec<R>
    where
        F: Fn(&Self) -> R + Sync,
        R: Send,
    {
        let endpoints = Self::mesh(rank_count);
        let f = &f;

        thread::scope(|s| {
            let handles = endpoints
                .iter()
                .map(|endpoint| s.spawn(move || f(endpoint)))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        })
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank < self.senders.len() {
            Ok(())
        } else {
            Err(Error::InvalidRank {
                rank,
                rank_count: self.senders.len(),
            })
        }
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn rank_count(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, destination: usize, tag: Tag, payload: Vec<u8>) -> Result<()> {
        self.check_rank(destination)?;

        let sender = self
            .senders
            .get(destination)
            .expect("destination was checked to be a valid rank");

        trace!(
            source = self.rank,
            destination,
            tag = tag.get(),
            len = payload.len(),
            "sending"
        );

        sender
            .send(Envelope { tag, payload })
            .ok()
            .ok_or(Error::Disconnected { rank: destination })
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        self.check_rank(source)?;

        let mut inbox = self.inbox.lock();

        if let Some(payload) = inbox
            .stashed
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(payload);
        }

        loop {
            let envelope = inbox
                .receivers
                .get(source)
                .expect("source was checked to be a valid rank")
                .recv()
                .ok()
                .ok_or(Error::Disconnected { rank: source })?;

            if envelope.tag == tag {
                return Ok(envelope.payload);
            }

            trace!(
                rank = self.rank,
                source,
                tag = envelope.tag.get(),
                "stashing message for another tag"
            );

            inbox
                .stashed
                .entry((source, envelope.tag))
                .or_default()
                .push_back(envelope.payload);
        }
    }

    fn barrier(&self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(LocalTransport: Send, Sync);

    #[test]
    fn mesh_assigns_ranks_in_order() {
        let endpoints = LocalTransport::mesh(4);

        for (index, endpoint) in endpoints.iter().enumerate() {
            assert_eq!(endpoint.rank(), index);
            assert_eq!(endpoint.rank_count(), 4);
        }
    }

    #[test]
    #[should_panic(expected = "at least one rank")]
    fn empty_mesh_panics() {
        drop(LocalTransport::mesh(0));
    }

    #[test]
    fn messages_from_one_source_keep_order() {
        let endpoints = LocalTransport::mesh(2);
        let tag = Tag::new(0);

        for value in 0..10_u8 {
            endpoints[0].send(1, tag, vec![value]).unwrap();
        }

        for value in 0..10_u8 {
            assert_eq!(endpoints[1].recv(0, tag).unwrap(), vec![value]);
        }
    }

    #[test]
    fn other_tags_are_stashed_until_requested() {
        let endpoints = LocalTransport::mesh(2);

        endpoints[0].send(1, Tag::new(1), vec![1]).unwrap();
        endpoints[0].send(1, Tag::new(2), vec![2]).unwrap();
        endpoints[0].send(1, Tag::new(1), vec![3]).unwrap();

        assert_eq!(endpoints[1].recv(0, Tag::new(2)).unwrap(), vec![2]);
        assert_eq!(endpoints[1].recv(0, Tag::new(1)).unwrap(), vec![1]);
        assert_eq!(endpoints[1].recv(0, Tag::new(1)).unwrap(), vec![3]);
    }

    #[test]
    fn sending_to_self_is_allowed() {
        let endpoints = LocalTransport::mesh(1);
        let tag = Tag::new(0);

        endpoints[0].send(0, tag, vec![42]).unwrap();

        assert_eq!(endpoints[0].recv(0, tag).unwrap(), vec![42]);
    }

    #[test]
    fn unknown_rank_is_rejected() {
        let endpoints = LocalTransport::mesh(2);

        assert!(matches!(
            endpoints[0].send(2, Tag::new(0), Vec::new()),
            Err(Error::InvalidRank {
                rank: 2,
                rank_count: 2
            })
        ));
        assert!(matches!(
            endpoints[0].recv(5, Tag::new(0)),
            Err(Error::InvalidRank { rank: 5, .. })
        ));
    }

    #[test]
    fn dropped_peer_is_reported_as_disconnected() {
        let mut endpoints = LocalTransport::mesh(2);
        let survivor = endpoints.remove(0);
        drop(endpoints);

        assert!(matches!(
            survivor.send(1, Tag::new(0), vec![1]),
            Err(Error::Disconnected { rank: 1 })
        ));
        assert!(matches!(
            survivor.recv(1, Tag::new(0)),
            Err(Error::Disconnected { rank: 1 })
        ));
    }

    #[test]
    fn run_ranks_returns_results_in_rank_order() {
        let ranks = LocalTransport::run_ranks(5, |transport| {
            transport.barrier().unwrap();
            transport.rank() * 10
        });

        assert_eq!(ranks, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn ring_exchange_completes() {
        let received = LocalTransport::run_ranks(4, |transport| {
            let tag = Tag::new(3);
            let next = (transport.rank() + 1) % transport.rank_count();
            let previous = (transport.rank() + transport.rank_count() - 1) % transport.rank_count();

            transport
                .send(next, tag, vec![u8::try_from(transport.rank()).unwrap()])
                .unwrap();
            transport.recv(previous, tag).unwrap()
        });

        assert_eq!(received, vec![vec![3], vec![0], vec![1], vec![2]]);
    }
}
