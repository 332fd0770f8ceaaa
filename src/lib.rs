//! P2P wire protocol, handshake, and compact-block relay for the Rubin
//! post-quantum UTXO node.
//!
//! This crate implements the network-facing core: envelope framing, the
//! version handshake, a per-peer ban-score-governed dispatch loop, the
//! headers/locator subsystem, and compact-block relay. Consensus
//! validation, the mempool, storage, and RPC all live in a node binary
//! that embeds this crate behind the [`network::PeerHandler`] and
//! [`consensus::CryptoProvider`] seams.

pub mod config;
pub mod consensus;
pub mod network;
pub mod utils;

pub use config::P2pConfig;
pub use consensus::{BlockHeader, CryptoProvider, Hash, Sha3CryptoProvider, Transaction};
pub use network::{EnvelopeError, Peer, PeerConfig, PeerError, PeerHandler};
