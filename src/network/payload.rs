//! Byte-exact payload codecs for every message this layer understands.
//!
//! Every multi-byte integer is little-endian unless stated otherwise.

use thiserror::Error;

use crate::consensus::{BlockHeader, Transaction, BLOCK_HEADER_SIZE};
use crate::network::compactsize::{self, CompactSizeError};

pub const MAX_USER_AGENT_BYTES: usize = 256;
pub const MAX_LOCATOR_HASHES: usize = 64;
pub const MAX_HEADERS_PER_MSG: usize = 2_000;
pub const MAX_REJECT_MESSAGE_BYTES: usize = 12;
pub const MAX_REJECT_REASON_BYTES: usize = 111;
pub const REJECT_CODE_INVALID: u8 = 0x10;
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unexpected payload length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("trailing bytes after payload")]
    TrailingBytes,
    #[error("compactsize error: {0}")]
    CompactSize(#[from] CompactSizeError),
    #[error("count {got} out of range [{min}, {max}]")]
    CountOutOfRange { got: usize, min: usize, max: usize },
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("string field too long: {got} > {max}")]
    StringTooLong { got: usize, max: usize },
    #[error("invalid flag value: {0}")]
    InvalidFlag(u8),
    #[error("truncated payload")]
    Truncated,
    #[error("non-increasing or out-of-range index in delta-encoded list")]
    BadIndexList,
    #[error("header parse error: {0}")]
    Header(#[from] crate::consensus::ConsensusError),
}

fn take<'a>(bytes: &'a [u8], n: usize) -> Result<(&'a [u8], &'a [u8]), PayloadError> {
    if bytes.len() < n {
        return Err(PayloadError::Truncated);
    }
    Ok((&bytes[..n], &bytes[n..]))
}

fn read_string(bytes: &[u8], max: usize) -> Result<(String, &[u8]), PayloadError> {
    let (len, width) = compactsize::decode(bytes)?;
    let rest = &bytes[width..];
    let len = len as usize;
    if len > max {
        return Err(PayloadError::StringTooLong { got: len, max });
    }
    let (body, rest) = take(rest, len)?;
    let s = std::str::from_utf8(body).map_err(|_| PayloadError::InvalidUtf8)?.to_string();
    Ok((s, rest))
}

fn append_string(out: &mut Vec<u8>, s: &str) {
    compactsize::append(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

// ---- Ping / Pong ----------------------------------------------------

pub fn encode_ping(nonce: u64) -> Vec<u8> {
    nonce.to_le_bytes().to_vec()
}

pub fn decode_ping(bytes: &[u8]) -> Result<u64, PayloadError> {
    if bytes.len() != 8 {
        return Err(PayloadError::WrongLength { expected: 8, got: bytes.len() });
    }
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

pub fn encode_pong(nonce: u64) -> Vec<u8> {
    encode_ping(nonce)
}

pub fn decode_pong(bytes: &[u8]) -> Result<u64, PayloadError> {
    decode_ping(bytes)
}

// ---- Version ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub protocol_version: u32,
    pub chain_id: [u8; 32],
    pub services: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
    pub relay: bool,
}

pub fn encode_version(v: &VersionPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + v.user_agent.len());
    out.extend_from_slice(&v.protocol_version.to_le_bytes());
    out.extend_from_slice(&v.chain_id);
    out.extend_from_slice(&v.services.to_le_bytes());
    out.extend_from_slice(&v.timestamp.to_le_bytes());
    out.extend_from_slice(&v.nonce.to_le_bytes());
    append_string(&mut out, &v.user_agent);
    out.extend_from_slice(&v.start_height.to_le_bytes());
    out.push(if v.relay { 1 } else { 0 });
    out
}

pub fn decode_version(bytes: &[u8]) -> Result<VersionPayload, PayloadError> {
    let (field, rest) = take(bytes, 4)?;
    let protocol_version = u32::from_le_bytes(field.try_into().unwrap());
    let (field, rest) = take(rest, 32)?;
    let mut chain_id = [0u8; 32];
    chain_id.copy_from_slice(field);
    let (field, rest) = take(rest, 8)?;
    let services = u64::from_le_bytes(field.try_into().unwrap());
    let (field, rest) = take(rest, 8)?;
    let timestamp = u64::from_le_bytes(field.try_into().unwrap());
    let (field, rest) = take(rest, 8)?;
    let nonce = u64::from_le_bytes(field.try_into().unwrap());
    let (user_agent, rest) = read_string(rest, MAX_USER_AGENT_BYTES)?;
    let (field, rest) = take(rest, 4)?;
    let start_height = u32::from_le_bytes(field.try_into().unwrap());
    let (field, rest) = take(rest, 1)?;
    let relay = match field[0] {
        0 => false,
        1 => true,
        other => return Err(PayloadError::InvalidFlag(other)),
    };
    if !rest.is_empty() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(VersionPayload {
        protocol_version,
        chain_id,
        services,
        timestamp,
        nonce,
        user_agent,
        start_height,
        relay,
    })
}

// ---- Reject -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectPayload {
    pub message: String,
    pub code: u8,
    pub reason: String,
}

pub fn encode_reject(r: &RejectPayload) -> Vec<u8> {
    let mut out = Vec::new();
    append_string(&mut out, &r.message);
    out.push(r.code);
    append_string(&mut out, &r.reason);
    out
}

pub fn decode_reject(bytes: &[u8]) -> Result<RejectPayload, PayloadError> {
    let (message, rest) = read_string(bytes, MAX_REJECT_MESSAGE_BYTES)?;
    if message.is_empty() {
        return Err(PayloadError::StringTooLong { got: 0, max: MAX_REJECT_MESSAGE_BYTES });
    }
    let (field, rest) = take(rest, 1)?;
    let code = field[0];
    let (reason, rest) = read_string(rest, MAX_REJECT_REASON_BYTES)?;
    if !rest.is_empty() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(RejectPayload { message, code, reason })
}

// ---- GetHeaders / Headers ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersPayload {
    pub version: u32,
    pub locator: Vec<[u8; 32]>,
    pub stop_hash: [u8; 32],
}

pub fn encode_get_headers(g: &GetHeadersPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 1 + g.locator.len() * 32 + 32);
    out.extend_from_slice(&g.version.to_le_bytes());
    compactsize::append(&mut out, g.locator.len() as u64);
    for h in &g.locator {
        out.extend_from_slice(h);
    }
    out.extend_from_slice(&g.stop_hash);
    out
}

pub fn decode_get_headers(bytes: &[u8]) -> Result<GetHeadersPayload, PayloadError> {
    let (field, rest) = take(bytes, 4)?;
    let version = u32::from_le_bytes(field.try_into().unwrap());
    let (count, width) = compactsize::decode(rest)?;
    let rest = &rest[width..];
    let count = count as usize;
    if count == 0 || count > MAX_LOCATOR_HASHES {
        return Err(PayloadError::CountOutOfRange { got: count, min: 1, max: MAX_LOCATOR_HASHES });
    }
    let (hashes_bytes, rest) = take(rest, count * 32)?;
    let mut locator = Vec::with_capacity(count);
    for chunk in hashes_bytes.chunks_exact(32) {
        let mut h = [0u8; 32];
        h.copy_from_slice(chunk);
        locator.push(h);
    }
    let (field, rest) = take(rest, 32)?;
    let mut stop_hash = [0u8; 32];
    stop_hash.copy_from_slice(field);
    if !rest.is_empty() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(GetHeadersPayload { version, locator, stop_hash })
}

pub fn encode_headers(headers: &[BlockHeader]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + headers.len() * BLOCK_HEADER_SIZE);
    compactsize::append(&mut out, headers.len() as u64);
    for h in headers {
        out.extend_from_slice(&h.to_canonical_bytes());
    }
    out
}

pub fn decode_headers(bytes: &[u8]) -> Result<Vec<BlockHeader>, PayloadError> {
    let (count, width) = compactsize::decode(bytes)?;
    let mut rest = &bytes[width..];
    let count = count as usize;
    if count > MAX_HEADERS_PER_MSG {
        return Err(PayloadError::CountOutOfRange { got: count, min: 0, max: MAX_HEADERS_PER_MSG });
    }
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        let (field, next) = take(rest, BLOCK_HEADER_SIZE)?;
        headers.push(BlockHeader::from_canonical_bytes(field)?);
        rest = next;
    }
    if !rest.is_empty() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(headers)
}

// ---- Inv / GetData / NotFound --------------------------------------------

pub const INV_TYPE_TX: u32 = 1;
pub const INV_TYPE_BLOCK: u32 = 2;
pub const INV_TYPE_CMPCT_BLOCK: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryItem {
    pub item_type: u32,
    pub hash: [u8; 32],
}

pub fn encode_inventory(items: &[InventoryItem]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + items.len() * 36);
    compactsize::append(&mut out, items.len() as u64);
    for item in items {
        out.extend_from_slice(&item.item_type.to_le_bytes());
        out.extend_from_slice(&item.hash);
    }
    out
}

const INVENTORY_ITEM_LEN: usize = 36;

pub fn decode_inventory(bytes: &[u8]) -> Result<Vec<InventoryItem>, PayloadError> {
    let (count, width) = compactsize::decode(bytes)?;
    let mut rest = &bytes[width..];
    let count = count as usize;
    // `count` is attacker-controlled; never reserve more than the remaining
    // bytes could possibly contain.
    let reservation = count.min(rest.len() / INVENTORY_ITEM_LEN);
    let mut items = Vec::with_capacity(reservation);
    for _ in 0..count {
        let (field, next) = take(rest, 4)?;
        let item_type = u32::from_le_bytes(field.try_into().unwrap());
        let (field, next) = take(next, 32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(field);
        items.push(InventoryItem { item_type, hash });
        rest = next;
    }
    if !rest.is_empty() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(items)
}

// ---- SendCmpct ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCmpctPayload {
    pub announce: bool,
    pub version: u32,
}

pub fn encode_send_cmpct(p: &SendCmpctPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(6);
    out.push(if p.announce { 1 } else { 0 });
    out.push(1); // shortid_wtxid flag, always 1
    out.extend_from_slice(&p.version.to_le_bytes());
    out
}

pub fn decode_send_cmpct(bytes: &[u8]) -> Result<SendCmpctPayload, PayloadError> {
    if bytes.len() != 6 {
        return Err(PayloadError::WrongLength { expected: 6, got: bytes.len() });
    }
    let announce = match bytes[0] {
        0 => false,
        1 => true,
        other => return Err(PayloadError::InvalidFlag(other)),
    };
    if bytes[1] != 1 {
        return Err(PayloadError::InvalidFlag(bytes[1]));
    }
    let version = u32::from_le_bytes(bytes[2..6].try_into().unwrap());
    Ok(SendCmpctPayload { announce, version })
}

// ---- Delta-encoded strictly-increasing index lists -----------------------

/// Encodes a strictly-increasing list of indices as CompactSize deltas:
/// the first index verbatim, each following index as `idx - prev - 1`.
pub fn encode_index_deltas(out: &mut Vec<u8>, indices: &[u64]) {
    compactsize::append(out, indices.len() as u64);
    let mut prev: Option<u64> = None;
    for &idx in indices {
        let delta = match prev {
            None => idx,
            Some(p) => idx - p - 1,
        };
        compactsize::append(out, delta);
        prev = Some(idx);
    }
}

/// Decodes a delta-encoded index list, rejecting any result that is not
/// strictly increasing or that contains an index `>= bound`.
pub fn decode_index_deltas(bytes: &[u8], bound: u64) -> Result<(Vec<u64>, usize), PayloadError> {
    let (count, mut offset) = compactsize::decode(bytes)?;
    let count = count as usize;
    // Each delta occupies at least one byte; never reserve past that bound.
    let reservation = count.min(bytes.len().saturating_sub(offset));
    let mut indices = Vec::with_capacity(reservation);
    let mut prev: Option<u64> = None;
    for _ in 0..count {
        let (delta, width) = compactsize::decode(&bytes[offset..])?;
        offset += width;
        let idx = match prev {
            None => delta,
            Some(p) => p
                .checked_add(delta)
                .and_then(|v| v.checked_add(1))
                .ok_or(PayloadError::BadIndexList)?,
        };
        if idx >= bound {
            return Err(PayloadError::BadIndexList);
        }
        if let Some(p) = prev {
            if idx <= p {
                return Err(PayloadError::BadIndexList);
            }
        }
        indices.push(idx);
        prev = Some(idx);
    }
    Ok((indices, offset))
}

// ---- GetBlockTxn / BlockTxn ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockTxnPayload {
    pub block_hash: [u8; 32],
    pub indices: Vec<u64>,
}

pub fn encode_get_block_txn(p: &GetBlockTxnPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 1 + p.indices.len() * 2);
    out.extend_from_slice(&p.block_hash);
    encode_index_deltas(&mut out, &p.indices);
    out
}

pub fn decode_get_block_txn(bytes: &[u8]) -> Result<GetBlockTxnPayload, PayloadError> {
    let (field, rest) = take(bytes, 32)?;
    let mut block_hash = [0u8; 32];
    block_hash.copy_from_slice(field);
    let (indices, consumed) = decode_index_deltas(rest, u64::MAX)?;
    if indices.is_empty() {
        return Err(PayloadError::CountOutOfRange { got: 0, min: 1, max: usize::MAX });
    }
    if consumed != rest.len() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(GetBlockTxnPayload { block_hash, indices })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTxnPayload {
    pub block_hash: [u8; 32],
    pub transactions: Vec<Transaction>,
}

pub fn encode_block_txn(p: &BlockTxnPayload) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&p.block_hash);
    compactsize::append(&mut out, p.transactions.len() as u64);
    for tx in &p.transactions {
        out.extend_from_slice(&tx.to_prefixed_bytes());
    }
    out
}

pub fn decode_block_txn(bytes: &[u8]) -> Result<BlockTxnPayload, PayloadError> {
    let (field, rest) = take(bytes, 32)?;
    let mut block_hash = [0u8; 32];
    block_hash.copy_from_slice(field);
    let (count, width) = compactsize::decode(rest)?;
    let mut offset = width;
    // Each transaction occupies at least one byte; never reserve past that.
    let reservation = (count as usize).min(rest.len().saturating_sub(offset));
    let mut transactions = Vec::with_capacity(reservation);
    for _ in 0..count {
        let (tx, consumed) = Transaction::parse_prefix(&rest[offset..])?;
        transactions.push(tx);
        offset += consumed;
    }
    if offset != rest.len() {
        return Err(PayloadError::TrailingBytes);
    }
    Ok(BlockTxnPayload { block_hash, transactions })
}
