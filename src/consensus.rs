//! Minimal consensus collaborator.
//!
//! The real chain-validation engine (transaction rules, PoW policy, UTXO
//! application) lives outside this crate. What remains here is just enough
//! shape — a hash type, a canonical block-header layout, an opaque
//! transaction byte container, and a hashing provider trait — for the P2P
//! wire layer to be built and tested in isolation.

use thiserror::Error;

/// A 32-byte digest, used for block hashes, transaction ids and wtxids.
pub type Hash = [u8; 32];

pub const BLOCK_HEADER_SIZE: usize = 116;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("truncated header: need {need} bytes, got {got}")]
    TruncatedHeader { need: usize, got: usize },
    #[error("truncated transaction")]
    TruncatedTransaction,
}

/// Canonical, fixed-width block header.
///
/// Layout (116 bytes total): version:u32 LE, prev_hash:32, merkle_root:32,
/// timestamp:u32 LE, target:32 (big-endian unsigned 256-bit), nonce:u64 LE,
/// reserved:4 (zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub target: [u8; 32],
    pub nonce: u64,
}

impl BlockHeader {
    pub fn to_canonical_bytes(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..104].copy_from_slice(&self.target);
        out[104..112].copy_from_slice(&self.nonce.to_le_bytes());
        // bytes 112..116 are reserved, left zero
        out
    }

    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, ConsensusError> {
        if bytes.len() < BLOCK_HEADER_SIZE {
            return Err(ConsensusError::TruncatedHeader {
                need: BLOCK_HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);
        let mut target = [0u8; 32];
        target.copy_from_slice(&bytes[72..104]);
        Ok(Self {
            version: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            prev_hash,
            merkle_root,
            timestamp: u32::from_le_bytes(bytes[68..72].try_into().unwrap()),
            target,
            nonce: u64::from_le_bytes(bytes[104..112].try_into().unwrap()),
        })
    }

    /// Big-endian unsigned 256-bit comparison: does `hash` satisfy `self.target`?
    pub fn meets_target(&self, hash: &Hash) -> bool {
        hash.as_slice() < self.target.as_slice()
    }
}

/// Opaque, canonically-encoded transaction.
///
/// Real transaction semantics (inputs/outputs/witness rules) are out of
/// scope here; what matters to the P2P layer is that transactions can be
/// parsed back-to-back out of a concatenated byte stream (no length
/// prefix) and re-serialized byte-identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    bytes: Vec<u8>,
}

impl Transaction {
    pub fn from_canonical_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn canonical_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Strict parse: the whole input must be exactly one transaction.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConsensusError> {
        let (tx, consumed) = Self::parse_prefix(bytes)?;
        if consumed != bytes.len() {
            return Err(ConsensusError::TruncatedTransaction);
        }
        Ok(tx)
    }

    /// Streaming parse: reads a length-prefixed (CompactSize) transaction
    /// body out of the front of `bytes` and reports how many bytes were
    /// consumed, so callers can split a concatenated stream of
    /// transactions without an external delimiter.
    pub fn parse_prefix(bytes: &[u8]) -> Result<(Self, usize), ConsensusError> {
        let (len, len_width) =
            crate::network::compactsize::decode(bytes).map_err(|_| ConsensusError::TruncatedTransaction)?;
        let len = len as usize;
        let total = len_width + len;
        if bytes.len() < total {
            return Err(ConsensusError::TruncatedTransaction);
        }
        let body = bytes[len_width..total].to_vec();
        Ok((Self { bytes: body }, total))
    }

    /// Re-encode with its CompactSize length prefix, as stored in
    /// `blocktxn` payloads.
    pub fn to_prefixed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + 9);
        crate::network::compactsize::append(&mut out, self.bytes.len() as u64);
        out.extend_from_slice(&self.bytes);
        out
    }
}

/// Supplies the hashing primitive the P2P layer needs (checksums, wtxids,
/// header hashes) without depending on a concrete cryptography crate at
/// the call sites.
pub trait CryptoProvider: Send + Sync {
    fn sha3_256(&self, bytes: &[u8]) -> Hash;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha3CryptoProvider;

impl CryptoProvider for Sha3CryptoProvider {
    fn sha3_256(&self, bytes: &[u8]) -> Hash {
        use sha3::{Digest, Sha3_256};
        let mut hasher = Sha3_256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

pub fn header_hash(provider: &dyn CryptoProvider, header: &BlockHeader) -> Hash {
    provider.sha3_256(&header.to_canonical_bytes())
}

pub fn wtxid(provider: &dyn CryptoProvider, tx: &Transaction) -> Hash {
    provider.sha3_256(tx.canonical_bytes())
}
