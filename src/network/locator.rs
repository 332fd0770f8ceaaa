//! Block locator height construction: a bounded, non-increasing list of
//! heights used to probe a peer for a common ancestor.

pub const MAX_LOCATOR_ENTRIES: usize = 64;
const DENSE_STEP_COUNT: u64 = 12;
const INITIAL_OFFSET: u64 = 14;
const INITIAL_STEP: u64 = 4;

/// Builds the locator height list for a tip at `tip_height`.
///
/// The first `DENSE_STEP_COUNT` entries are consecutive heights counting
/// down from the tip. After that, entries step back by a geometrically
/// doubling offset. The list always ends at height 0 and never exceeds
/// `MAX_LOCATOR_ENTRIES` entries.
pub fn build(tip_height: u64) -> Vec<u64> {
    let mut heights = Vec::with_capacity(MAX_LOCATOR_ENTRIES);

    let mut height = tip_height;
    for _ in 0..DENSE_STEP_COUNT {
        heights.push(height);
        if height == 0 || heights.len() == MAX_LOCATOR_ENTRIES {
            return finish(heights);
        }
        height -= 1;
    }

    let mut offset = INITIAL_OFFSET;
    let mut step = INITIAL_STEP;
    loop {
        if offset > tip_height {
            break;
        }
        let next = tip_height - offset;
        heights.push(next);
        if next == 0 || heights.len() == MAX_LOCATOR_ENTRIES {
            return finish(heights);
        }
        offset += step;
        step = step.saturating_mul(2);
    }

    finish(heights)
}

fn finish(mut heights: Vec<u64>) -> Vec<u64> {
    if heights.last() != Some(&0) {
        if heights.len() == MAX_LOCATOR_ENTRIES {
            let last = heights.len() - 1;
            heights[last] = 0;
        } else {
            heights.push(0);
        }
    }
    heights
}
