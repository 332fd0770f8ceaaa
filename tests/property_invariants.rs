//! Property-style tests over arbitrary inputs, supplementing the literal
//! scenarios covered by the inline unit tests in each module.

use proptest::prelude::*;
use std::time::{Duration, Instant};

use rubin_p2p::consensus::{BlockHeader, Transaction};
use rubin_p2p::network::ban_score::BanScore;
use rubin_p2p::network::compact_blocks::{self, CompactBlock, PrefilledTransaction};
use rubin_p2p::network::compactsize;
use rubin_p2p::network::locator;

proptest! {
    #[test]
    fn compactsize_roundtrips_for_any_value(value in any::<u64>()) {
        let encoded = compactsize::encode(value);
        prop_assert_eq!(encoded.len(), compactsize::width(value));
        let (decoded, consumed) = compactsize::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn compactsize_decode_never_accepts_a_wider_than_minimal_width(value in 0u64..0xfc) {
        // Any value that fits the single-byte form must be rejected when
        // presented padded out to a wider marker.
        let wide_16 = [0xfd, value as u8, 0x00];
        prop_assert!(compactsize::decode(&wide_16).is_err());
    }
}

proptest! {
    #[test]
    fn ban_score_never_exceeds_additions_and_never_goes_negative(
        deltas in prop::collection::vec(0u64..200, 1..20),
        minutes_between in prop::collection::vec(0u64..200, 1..20),
    ) {
        let mut bs = BanScore::new();
        let t0 = Instant::now();
        let mut now = t0;
        let mut total_added = 0u64;
        for (i, delta) in deltas.iter().enumerate() {
            let gap = minutes_between.get(i).copied().unwrap_or(0);
            now += Duration::from_secs(gap * 60);
            bs.add(now, *delta);
            total_added += delta;
            let score = bs.score(now);
            prop_assert!(score <= total_added);
        }
    }

    #[test]
    fn ban_score_decay_is_monotonic_non_increasing_over_time(
        initial in 0u64..500,
        minutes in 0u64..200,
    ) {
        let mut bs = BanScore::new();
        let t0 = Instant::now();
        bs.add(t0, initial);
        let before = bs.score(t0 + Duration::from_secs(minutes * 60));
        let after = bs.score(t0 + Duration::from_secs((minutes + 1) * 60));
        prop_assert!(after <= before);
    }
}

proptest! {
    #[test]
    fn locator_is_bounded_strictly_decreasing_and_ends_at_zero(tip in 0u64..10_000_000) {
        let heights = locator::build(tip);
        prop_assert!(heights.len() <= locator::MAX_LOCATOR_ENTRIES);
        prop_assert_eq!(*heights.last().unwrap(), 0);
        prop_assert!(heights.iter().all(|&h| h <= tip));
        for window in heights.windows(2) {
            prop_assert!(window[0] > window[1]);
        }
    }
}

proptest! {
    #[test]
    fn compact_block_roundtrip_holds_for_arbitrary_split(
        short_id_count in 0usize..20,
        prefilled_count in 1usize..10,
    ) {
        let header = BlockHeader {
            version: 1,
            prev_hash: [3u8; 32],
            merkle_root: [4u8; 32],
            timestamp: 1000,
            target: [0xff; 32],
            nonce: 0,
        };
        let tx_count = short_id_count + prefilled_count;
        let short_ids: Vec<[u8; 6]> = (0..short_id_count).map(|i| [i as u8; 6]).collect();
        let prefilled: Vec<PrefilledTransaction> = (0..prefilled_count)
            .map(|i| PrefilledTransaction {
                index: short_id_count + i,
                transaction: Transaction::from_canonical_bytes(vec![i as u8; 3]),
            })
            .collect();
        let block = CompactBlock { header, nonce: 7, tx_count, short_ids, prefilled };

        prop_assert!(block.validate_accounting().is_ok());
        let encoded = compact_blocks::encode(&block).unwrap();
        let decoded = compact_blocks::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, block);
    }
}
