//! Rank-to-rank message transport.
//!
//! [`Communicator`] abstracts the transport between the coordinator (rank 0)
//! and the workers (ranks `1..world_size`). The in-process [`ChannelEndpoint`]
//! backend wires every rank pair with its own channel link, which keeps the
//! per-link message order total and lets a network transport slot in behind
//! the same trait later.
//!
//! Deadlock safety rests on two properties: sends never block, and every
//! exchange posts its count message before its payload message, so matching
//! receives always find data in tag order.

use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::messages::{ParticlePayload, Tunables};

/// Rank of the coordinator process.
pub const COORDINATOR_RANK: usize = 0;

/// Protocol tag identifying the payload kind of a message.
///
/// Discriminants are the wire tag values; `FrameCoords` is tag 17.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// Scattered parameter snapshot.
    Tunables = 10,
    /// Out-of-bounds migration count.
    OobCount = 11,
    /// Out-of-bounds particle records.
    OobParticles = 12,
    /// Halo mirror count.
    HaloCount = 13,
    /// Halo particle records.
    HaloParticles = 14,
    /// Intra-iteration constraint-multiplier refresh for halo mirrors.
    HaloLambdas = 15,
    /// Intra-iteration predicted-position refresh for halo mirrors.
    HaloPositions = 16,
    /// Packed pixel-space frame coordinates.
    FrameCoords = 17,
}

/// A transport message: tagged payload travelling over one rank-pair link.
#[derive(Debug, Clone)]
pub enum Message {
    /// Scattered parameter snapshot.
    Tunables(Tunables),
    /// Out-of-bounds migration count.
    OobCount(u32),
    /// Out-of-bounds particle records.
    OobParticles(Vec<ParticlePayload>),
    /// Halo mirror count.
    HaloCount(u32),
    /// Halo particle records.
    HaloParticles(Vec<ParticlePayload>),
    /// Constraint multipliers, in established halo order.
    HaloLambdas(Vec<f32>),
    /// Predicted positions, in established halo order.
    HaloPositions(Vec<[f32; 2]>),
    /// Packed pixel-space frame coordinates.
    FrameCoords(Vec<i16>),
}

impl Message {
    /// The protocol tag of this payload.
    pub fn tag(&self) -> Tag {
        match self {
            Message::Tunables(_) => Tag::Tunables,
            Message::OobCount(_) => Tag::OobCount,
            Message::OobParticles(_) => Tag::OobParticles,
            Message::HaloCount(_) => Tag::HaloCount,
            Message::HaloParticles(_) => Tag::HaloParticles,
            Message::HaloLambdas(_) => Tag::HaloLambdas,
            Message::HaloPositions(_) => Tag::HaloPositions,
            Message::FrameCoords(_) => Tag::FrameCoords,
        }
    }
}

/// Transport failure.
#[derive(Debug)]
pub enum CommError {
    /// The peer's endpoint has been dropped.
    Disconnected {
        /// Rank of the vanished peer.
        peer: usize,
    },
    /// No link exists to the requested rank (out of range or self).
    NoLink {
        /// Requested rank.
        peer: usize,
    },
    /// A message arrived whose tag does not match the protocol position.
    TagMismatch {
        /// Sending rank.
        peer: usize,
        /// Tag the protocol expected next on this link.
        expected: Tag,
        /// Tag actually received.
        got: Tag,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::Disconnected { peer } => write!(f, "rank {peer} disconnected"),
            CommError::NoLink { peer } => write!(f, "no link to rank {peer}"),
            CommError::TagMismatch { peer, expected, got } => {
                write!(f, "protocol violation from rank {peer}: expected {expected:?}, got {got:?}")
            }
        }
    }
}

impl std::error::Error for CommError {}

/// Completion token of an asynchronous send.
///
/// Channel delivery finishes at send time, so `wait` returns immediately for
/// the in-process backend; the token exists to keep the send/compute overlap
/// of the frame pipeline explicit at the call sites.
#[derive(Debug)]
pub struct SendHandle {
    _private: (),
}

impl SendHandle {
    /// Block until the transfer has completed.
    pub fn wait(self) {}
}

/// Message transport between ranks.
pub trait Communicator: Send {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks, coordinator included.
    fn world_size(&self) -> usize;

    /// Send a message to `dst`, never blocking.
    fn send(&self, dst: usize, msg: Message) -> Result<(), CommError>;

    /// Start an asynchronous send to `dst`; the returned handle must be
    /// waited on before the buffer is reused.
    fn isend(&self, dst: usize, msg: Message) -> Result<SendHandle, CommError>;

    /// Receive the next message from `src`, blocking until it arrives.
    /// Returns a protocol error if its tag is not `expected`.
    fn recv(&self, src: usize, expected: Tag) -> Result<Message, CommError>;
}

/// In-process communicator endpoint for one rank.
pub struct ChannelEndpoint {
    rank: usize,
    world_size: usize,
    tx: Vec<Option<Sender<Message>>>,
    rx: Vec<Option<Receiver<Message>>>,
}

impl Communicator for ChannelEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn send(&self, dst: usize, msg: Message) -> Result<(), CommError> {
        let sender = self
            .tx
            .get(dst)
            .and_then(Option::as_ref)
            .ok_or(CommError::NoLink { peer: dst })?;
        sender.send(msg).map_err(|_| CommError::Disconnected { peer: dst })
    }

    fn isend(&self, dst: usize, msg: Message) -> Result<SendHandle, CommError> {
        self.send(dst, msg)?;
        Ok(SendHandle { _private: () })
    }

    fn recv(&self, src: usize, expected: Tag) -> Result<Message, CommError> {
        let receiver = self
            .rx
            .get(src)
            .and_then(Option::as_ref)
            .ok_or(CommError::NoLink { peer: src })?;
        let msg = receiver.recv().map_err(|_| CommError::Disconnected { peer: src })?;
        if msg.tag() != expected {
            return Err(CommError::TagMismatch { peer: src, expected, got: msg.tag() });
        }
        Ok(msg)
    }
}

/// Build a fully connected in-process mesh of `world_size` endpoints.
///
/// Element `r` of the result is the endpoint for rank `r`.
pub fn channel_mesh(world_size: usize) -> Vec<ChannelEndpoint> {
    assert!(world_size >= 2, "a cluster needs a coordinator and at least one worker");

    let mut tx: Vec<Vec<Option<Sender<Message>>>> =
        (0..world_size).map(|_| (0..world_size).map(|_| None).collect()).collect();
    let mut rx: Vec<Vec<Option<Receiver<Message>>>> =
        (0..world_size).map(|_| (0..world_size).map(|_| None).collect()).collect();

    for src in 0..world_size {
        for dst in 0..world_size {
            if src == dst {
                continue;
            }
            let (sender, receiver) = channel();
            tx[src][dst] = Some(sender);
            rx[dst][src] = Some(receiver);
        }
    }

    tx.into_iter()
        .zip(rx)
        .enumerate()
        .map(|(rank, (tx, rx))| ChannelEndpoint { rank, world_size, tx, rx })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_routes_between_ranks() {
        let mut mesh = channel_mesh(3);
        let c = mesh.remove(0);
        let w1 = mesh.remove(0);
        let w2 = mesh.remove(0);

        w1.send(0, Message::OobCount(7)).unwrap();
        w2.send(0, Message::OobCount(9)).unwrap();

        match c.recv(1, Tag::OobCount).unwrap() {
            Message::OobCount(n) => assert_eq!(n, 7),
            other => panic!("unexpected message {other:?}"),
        }
        match c.recv(2, Tag::OobCount).unwrap() {
            Message::OobCount(n) => assert_eq!(n, 9),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn per_link_order_is_preserved() {
        let mut mesh = channel_mesh(2);
        let c = mesh.remove(0);
        let w = mesh.remove(0);

        w.send(0, Message::HaloCount(1)).unwrap();
        w.send(0, Message::HaloParticles(Vec::new())).unwrap();

        assert_eq!(c.recv(1, Tag::HaloCount).unwrap().tag(), Tag::HaloCount);
        assert_eq!(c.recv(1, Tag::HaloParticles).unwrap().tag(), Tag::HaloParticles);
    }

    #[test]
    fn tag_mismatch_is_reported() {
        let mut mesh = channel_mesh(2);
        let c = mesh.remove(0);
        let w = mesh.remove(0);

        w.send(0, Message::OobCount(1)).unwrap();
        let err = c.recv(1, Tag::HaloCount).unwrap_err();
        assert!(matches!(err, CommError::TagMismatch { peer: 1, .. }));
    }

    #[test]
    fn self_link_does_not_exist() {
        let mesh = channel_mesh(2);
        assert!(matches!(mesh[0].send(0, Message::OobCount(0)), Err(CommError::NoLink { peer: 0 })));
    }

    #[test]
    fn disconnect_is_reported() {
        let mut mesh = channel_mesh(2);
        let c = mesh.remove(0);
        drop(mesh); // drops the worker endpoint
        assert!(matches!(c.recv(1, Tag::FrameCoords), Err(CommError::Disconnected { peer: 1 })));
    }

    #[test]
    fn isend_completes_for_channel_backend() {
        let mut mesh = channel_mesh(2);
        let c = mesh.remove(0);
        let w = mesh.remove(0);

        let handle = w.isend(0, Message::FrameCoords(vec![1, 2])).unwrap();
        handle.wait();
        assert_eq!(c.recv(1, Tag::FrameCoords).unwrap().tag(), Tag::FrameCoords);
    }
}
