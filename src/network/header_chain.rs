//! Stateless policy-level validation over a batch of incoming headers,
//! layered above (not instead of) the consensus engine's own checks.

use thiserror::Error;

use crate::consensus::{header_hash, BlockHeader, CryptoProvider};

pub const MAX_FUTURE_DRIFT_SECS: u32 = 2 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderChainError {
    #[error("header does not link to the expected ancestor")]
    LinkageInvalid,
    #[error("proof of work does not meet target")]
    PowInvalid,
    #[error("target does not match the expected retarget value")]
    TargetInvalid,
    #[error("timestamp is not greater than the median of recent ancestors")]
    TimestampOld,
    #[error("timestamp is too far in the future")]
    TimestampFuture,
    #[error("other header validation failure: {0}")]
    Other(String),
}

/// Ancestry context for validating a batch, most-recent-first.
pub struct AncestryContext<'a> {
    pub ancestors: &'a [BlockHeader],
    pub height: u64,
    pub local_time: Option<u32>,
}

fn expected_target(_ancestors: &[BlockHeader]) -> [u8; 32] {
    // Retarget-rule computation belongs to the consensus collaborator; this
    // policy layer only re-checks that the header agrees with the most
    // recent ancestor's target when no retarget is due, which is the only
    // case expressible without importing consensus difficulty logic.
    _ancestors.first().map(|h| h.target).unwrap_or([0xff; 32])
}

fn median_past_timestamp(ancestors: &[BlockHeader]) -> Option<u32> {
    if ancestors.is_empty() {
        return None;
    }
    let mut timestamps: Vec<u32> = ancestors.iter().map(|h| h.timestamp).collect();
    timestamps.sort_unstable();
    Some(timestamps[timestamps.len() / 2])
}

/// Validates one header against the ancestry context, returning the
/// updated ancestry (header prepended) on success.
pub fn validate_header(
    provider: &dyn CryptoProvider,
    ctx: &AncestryContext<'_>,
    header: &BlockHeader,
) -> Result<Vec<BlockHeader>, HeaderChainError> {
    let ancestry_known = ctx.height > 0 && !ctx.ancestors.is_empty();

    if ancestry_known {
        let last = ctx.ancestors[0];
        let last_hash = header_hash(provider, &last);
        if header.prev_hash != last_hash {
            return Err(HeaderChainError::LinkageInvalid);
        }

        let expected = expected_target(ctx.ancestors);
        if header.target != expected {
            return Err(HeaderChainError::TargetInvalid);
        }

        if let Some(median) = median_past_timestamp(ctx.ancestors) {
            if header.timestamp <= median {
                return Err(HeaderChainError::TimestampOld);
            }
        }
    }

    if let Some(local_time) = ctx.local_time {
        if header.timestamp > local_time.saturating_add(MAX_FUTURE_DRIFT_SECS) {
            return Err(HeaderChainError::TimestampFuture);
        }
    }

    let hash = header_hash(provider, header);
    if !header.meets_target(&hash) {
        return Err(HeaderChainError::PowInvalid);
    }

    let mut next_ancestry = Vec::with_capacity(ctx.ancestors.len() + 1);
    next_ancestry.push(*header);
    next_ancestry.extend_from_slice(ctx.ancestors);
    Ok(next_ancestry)
}

/// Validates a full batch of headers in order, threading the ancestry
/// context between successive calls.
pub fn validate_batch(
    provider: &dyn CryptoProvider,
    mut ancestors: Vec<BlockHeader>,
    mut height: u64,
    local_time: Option<u32>,
    headers: &[BlockHeader],
) -> Result<Vec<BlockHeader>, HeaderChainError> {
    for header in headers {
        let ctx = AncestryContext { ancestors: &ancestors, height, local_time };
        ancestors = validate_header(provider, &ctx, header)?;
        height += 1;
    }
    Ok(ancestors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Sha3CryptoProvider;

    fn genesis() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            timestamp: 1_000,
            target: [0xff; 32],
            nonce: 0,
        }
    }

    #[test]
    fn first_header_with_no_ancestry_only_checks_pow_and_future_drift() {
        let provider = Sha3CryptoProvider;
        let header = genesis();
        let ctx = AncestryContext { ancestors: &[], height: 0, local_time: None };
        let result = validate_header(&provider, &ctx, &header).unwrap();
        assert_eq!(result, vec![header]);
    }

    #[test]
    fn linkage_mismatch_is_rejected() {
        let provider = Sha3CryptoProvider;
        let last = genesis();
        let bad_child = BlockHeader { prev_hash: [0xaa; 32], ..last };
        let ctx = AncestryContext { ancestors: &[last], height: 1, local_time: None };
        assert_eq!(
            validate_header(&provider, &ctx, &bad_child),
            Err(HeaderChainError::LinkageInvalid)
        );
    }

    #[test]
    fn future_timestamp_is_rejected_as_deferrable() {
        let provider = Sha3CryptoProvider;
        let header = BlockHeader { timestamp: 100_000, ..genesis() };
        let ctx = AncestryContext { ancestors: &[], height: 0, local_time: Some(10) };
        assert_eq!(
            validate_header(&provider, &ctx, &header),
            Err(HeaderChainError::TimestampFuture)
        );
    }
}
