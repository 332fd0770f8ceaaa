//! P2P wire protocol: envelope framing, handshake, peer run loop,
//! headers/locator subsystem, and compact-block relay.

pub mod ban_score;
pub mod compact_blocks;
pub mod compactsize;
pub mod envelope;
pub mod handshake;
pub mod header_chain;
pub mod locator;
pub mod payload;
pub mod peer;
pub mod tcp_transport;
pub mod transport;

pub use envelope::{EnvelopeError, Message};
pub use peer::{Peer, PeerConfig, PeerError, PeerHandler};
