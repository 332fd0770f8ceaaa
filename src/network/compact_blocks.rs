//! Compact-block relay: SipHash-2-4 short-ID derivation and the
//! compact-block / getblocktxn / blocktxn wire payloads.

use siphasher::sip::SipHasher24;
use std::hash::Hasher;
use thiserror::Error;

use crate::consensus::{wtxid, BlockHeader, CryptoProvider, Transaction, BLOCK_HEADER_SIZE};
use crate::network::compactsize;
use crate::network::payload::{self, PayloadError};

pub const SHORT_ID_LEN: usize = 6;
const KEY_DOMAIN: &[u8] = b"RUBIN-CMPCT-v1";

#[derive(Debug, Error)]
pub enum CompactBlockError {
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("short id / prefilled accounting mismatch: {short_ids} + {prefilled} != {total}")]
    AccountingMismatch { short_ids: usize, prefilled: usize, total: usize },
    #[error("prefilled transaction index {index} out of range for tx_count {total}")]
    PrefilledIndexOutOfRange { index: usize, total: usize },
    #[error("prefilled transaction at index {index} does not re-parse canonically")]
    NonCanonicalPrefilled { index: usize },
}

pub type ShortId = [u8; SHORT_ID_LEN];

/// Derives the SipHash-2-4 keys for a given header + nonce, with domain
/// separation so short ids cannot be confused across unrelated protocols.
pub fn derive_keys(provider: &dyn CryptoProvider, header: &BlockHeader, nonce: u64) -> (u64, u64) {
    let mut material = Vec::with_capacity(KEY_DOMAIN.len() + BLOCK_HEADER_SIZE + 8);
    material.extend_from_slice(KEY_DOMAIN);
    material.extend_from_slice(&header.to_canonical_bytes());
    material.extend_from_slice(&nonce.to_le_bytes());
    let keys = provider.sha3_256(&material);
    let k0 = u64::from_le_bytes(keys[0..8].try_into().unwrap());
    let k1 = u64::from_le_bytes(keys[8..16].try_into().unwrap());
    (k0, k1)
}

/// Computes the 6-byte short id for a transaction given derived keys.
pub fn short_id_for_tx(provider: &dyn CryptoProvider, keys: (u64, u64), tx: &Transaction) -> ShortId {
    let digest = wtxid(provider, tx);
    let mut hasher = SipHasher24::new_with_keys(keys.0, keys.1);
    hasher.write(&digest);
    let s64 = hasher.finish();
    let bytes = s64.to_le_bytes();
    let mut out = [0u8; SHORT_ID_LEN];
    out.copy_from_slice(&bytes[..SHORT_ID_LEN]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilledTransaction {
    pub index: usize,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    pub header: BlockHeader,
    pub nonce: u64,
    pub tx_count: usize,
    pub short_ids: Vec<ShortId>,
    pub prefilled: Vec<PrefilledTransaction>,
}

impl CompactBlock {
    pub fn validate_accounting(&self) -> Result<(), CompactBlockError> {
        if self.tx_count == 0 {
            return Err(CompactBlockError::AccountingMismatch {
                short_ids: self.short_ids.len(),
                prefilled: self.prefilled.len(),
                total: 0,
            });
        }
        if self.short_ids.len() + self.prefilled.len() != self.tx_count {
            return Err(CompactBlockError::AccountingMismatch {
                short_ids: self.short_ids.len(),
                prefilled: self.prefilled.len(),
                total: self.tx_count,
            });
        }
        for p in &self.prefilled {
            if p.index >= self.tx_count {
                return Err(CompactBlockError::PrefilledIndexOutOfRange { index: p.index, total: self.tx_count });
            }
        }
        Ok(())
    }
}

pub fn encode(block: &CompactBlock) -> Result<Vec<u8>, CompactBlockError> {
    block.validate_accounting()?;
    let mut out = Vec::new();
    out.extend_from_slice(&block.header.to_canonical_bytes());
    out.extend_from_slice(&block.nonce.to_le_bytes());
    compactsize::append(&mut out, block.tx_count as u64);

    compactsize::append(&mut out, block.short_ids.len() as u64);
    for id in &block.short_ids {
        out.extend_from_slice(id);
    }

    let indices: Vec<u64> = block.prefilled.iter().map(|p| p.index as u64).collect();
    payload::encode_index_deltas(&mut out, &indices);
    for p in &block.prefilled {
        let prefixed = p.transaction.to_prefixed_bytes();
        let (reparsed, consumed) = Transaction::parse_prefix(&prefixed)
            .map_err(|_| CompactBlockError::NonCanonicalPrefilled { index: p.index })?;
        if consumed != prefixed.len() || reparsed != p.transaction {
            return Err(CompactBlockError::NonCanonicalPrefilled { index: p.index });
        }
        out.extend_from_slice(&prefixed);
    }

    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<CompactBlock, CompactBlockError> {
    let header = BlockHeader::from_canonical_bytes(bytes).map_err(|_| {
        CompactBlockError::Payload(PayloadError::Truncated)
    })?;
    let mut offset = BLOCK_HEADER_SIZE;

    let nonce_bytes = bytes.get(offset..offset + 8).ok_or(PayloadError::Truncated)?;
    let nonce = u64::from_le_bytes(nonce_bytes.try_into().unwrap());
    offset += 8;

    let (tx_count, width) = compactsize::decode(&bytes[offset..]).map_err(PayloadError::from)?;
    offset += width;
    let tx_count = tx_count as usize;

    let (short_id_count, width) = compactsize::decode(&bytes[offset..]).map_err(PayloadError::from)?;
    offset += width;
    let short_id_count = short_id_count as usize;
    // `short_id_count` is attacker-controlled; never reserve more than the
    // remaining bytes could possibly contain.
    let reservation = short_id_count.min(bytes.len().saturating_sub(offset) / SHORT_ID_LEN);
    let mut short_ids = Vec::with_capacity(reservation);
    for _ in 0..short_id_count {
        let chunk = bytes.get(offset..offset + SHORT_ID_LEN).ok_or(PayloadError::Truncated)?;
        let mut id = [0u8; SHORT_ID_LEN];
        id.copy_from_slice(chunk);
        short_ids.push(id);
        offset += SHORT_ID_LEN;
    }

    let (indices, consumed) = payload::decode_index_deltas(&bytes[offset..], tx_count as u64)?;
    offset += consumed;

    let mut prefilled = Vec::with_capacity(indices.len());
    for idx in indices {
        let (tx, consumed) = Transaction::parse_prefix(&bytes[offset..]).map_err(|_| PayloadError::Truncated)?;
        prefilled.push(PrefilledTransaction { index: idx as usize, transaction: tx });
        offset += consumed;
    }

    if offset != bytes.len() {
        return Err(CompactBlockError::Payload(PayloadError::TrailingBytes));
    }

    let block = CompactBlock { header, nonce, tx_count, short_ids, prefilled };
    block.validate_accounting()?;
    Ok(block)
}

/// Reconstructs the short ids expected for a set of mempool transactions
/// not already prefilled, for matching against the announced short ids.
pub fn expected_short_ids(
    provider: &dyn CryptoProvider,
    header: &BlockHeader,
    nonce: u64,
    candidates: &[Transaction],
) -> Vec<(ShortId, usize)> {
    let keys = derive_keys(provider, header, nonce);
    candidates
        .iter()
        .enumerate()
        .map(|(i, tx)| (short_id_for_tx(provider, keys, tx), i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Sha3CryptoProvider;

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: [1u8; 32],
            merkle_root: [2u8; 32],
            timestamp: 123,
            target: [0xff; 32],
            nonce: 0,
        }
    }

    #[test]
    fn short_id_derivation_is_deterministic() {
        let provider = Sha3CryptoProvider;
        let h = header();
        let tx = Transaction::from_canonical_bytes(vec![1, 2, 3, 4]);
        let keys = derive_keys(&provider, &h, 42);
        let a = short_id_for_tx(&provider, keys, &tx);
        let b = short_id_for_tx(&provider, keys, &tx);
        assert_eq!(a, b);
    }

    #[test]
    fn different_nonce_changes_short_id() {
        let provider = Sha3CryptoProvider;
        let h = header();
        let tx = Transaction::from_canonical_bytes(vec![9, 9, 9]);
        let keys_a = derive_keys(&provider, &h, 1);
        let keys_b = derive_keys(&provider, &h, 2);
        assert_ne!(
            short_id_for_tx(&provider, keys_a, &tx),
            short_id_for_tx(&provider, keys_b, &tx)
        );
    }

    #[test]
    fn compact_block_roundtrip() {
        let block = CompactBlock {
            header: header(),
            nonce: 42,
            tx_count: 2,
            short_ids: vec![[1, 2, 3, 4, 5, 6]],
            prefilled: vec![PrefilledTransaction {
                index: 0,
                transaction: Transaction::from_canonical_bytes(vec![7, 7, 7]),
            }],
        };
        let encoded = encode(&block).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn accounting_mismatch_is_rejected_at_encode() {
        let block = CompactBlock {
            header: header(),
            nonce: 1,
            tx_count: 5,
            short_ids: vec![[0u8; 6]],
            prefilled: vec![],
        };
        assert!(encode(&block).is_err());
    }

    #[test]
    fn zero_tx_count_is_rejected() {
        let block = CompactBlock {
            header: header(),
            nonce: 1,
            tx_count: 0,
            short_ids: vec![],
            prefilled: vec![],
        };
        assert!(matches!(
            block.validate_accounting(),
            Err(CompactBlockError::AccountingMismatch { total: 0, .. })
        ));
        assert!(encode(&block).is_err());
    }

    #[test]
    fn decode_rejects_zero_tx_count() {
        // Hand-build a frame with tx_count = 0, no short ids, no prefilled.
        let mut bytes = header().to_canonical_bytes().to_vec();
        bytes.extend_from_slice(&1u64.to_le_bytes()); // nonce
        compactsize::append(&mut bytes, 0); // tx_count
        compactsize::append(&mut bytes, 0); // short_id_count
        compactsize::append(&mut bytes, 0); // prefilled count
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn get_block_txn_and_block_txn_roundtrip() {
        let request = payload::GetBlockTxnPayload { block_hash: [5u8; 32], indices: vec![1, 3] };
        let encoded = payload::encode_get_block_txn(&request);
        assert_eq!(payload::decode_get_block_txn(&encoded).unwrap(), request);

        let response = payload::BlockTxnPayload {
            block_hash: [5u8; 32],
            transactions: vec![Transaction::from_canonical_bytes(vec![1, 2])],
        };
        let encoded = payload::encode_block_txn(&response);
        assert_eq!(payload::decode_block_txn(&encoded).unwrap(), response);
    }
}
