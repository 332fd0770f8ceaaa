//! Decaying per-peer misbehaviour score.
//!
//! One point decays per minute of elapsed time. A clock regression (the
//! wall clock moving backwards) never raises the score; it just resets the
//! decay baseline.

use std::time::{Duration, Instant};

pub const THROTTLE_THRESHOLD: u64 = 50;
pub const BAN_THRESHOLD: u64 = 100;
pub const THROTTLE_DELAY: Duration = Duration::from_millis(500);
const DECAY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct BanScore {
    score: u64,
    last_updated: Option<Instant>,
}

impl Default for BanScore {
    fn default() -> Self {
        Self::new()
    }
}

impl BanScore {
    pub fn new() -> Self {
        Self {
            score: 0,
            last_updated: None,
        }
    }

    fn decay(&mut self, now: Instant) {
        let Some(last) = self.last_updated else {
            self.last_updated = Some(now);
            return;
        };
        if now < last {
            // Monotonic-clock protection: never let a backward jump raise
            // the score, and don't retroactively decay for negative time.
            self.last_updated = Some(now);
            return;
        }
        let elapsed = now.duration_since(last);
        let minutes = elapsed.as_secs() / DECAY_INTERVAL.as_secs();
        if minutes > 0 {
            self.score = self.score.saturating_sub(minutes);
            self.last_updated = Some(now);
        }
    }

    /// Current score after applying decay up to `now`.
    pub fn score(&mut self, now: Instant) -> u64 {
        self.decay(now);
        self.score
    }

    /// Adds `delta` to the score (after decay), clamped at zero from below.
    pub fn add(&mut self, now: Instant, delta: u64) -> u64 {
        self.decay(now);
        self.score = self.score.saturating_add(delta);
        self.score
    }

    pub fn should_throttle(&mut self, now: Instant) -> bool {
        self.score(now) >= THROTTLE_THRESHOLD
    }

    pub fn should_ban(&mut self, now: Instant) -> bool {
        self.score(now) >= BAN_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_one_point_per_minute() {
        let mut bs = BanScore::new();
        let t0 = Instant::now();
        bs.add(t0, 60);
        assert_eq!(bs.score(t0), 60);
        assert_eq!(bs.score(t0 + Duration::from_secs(600)), 50);
        assert_eq!(bs.score(t0 + Duration::from_secs(6600)), 0);
    }

    #[test]
    fn clamps_at_zero() {
        let mut bs = BanScore::new();
        let t0 = Instant::now();
        bs.add(t0, 5);
        assert_eq!(bs.score(t0 + Duration::from_secs(6000)), 0);
    }

    #[test]
    fn clock_regression_never_raises_score() {
        let mut bs = BanScore::new();
        let t0 = Instant::now() + Duration::from_secs(3600);
        bs.add(t0, 10);
        let earlier = t0 - Duration::from_secs(120);
        // A backward jump must not cause extra decay or score increase.
        assert_eq!(bs.score(earlier), 10);
        assert_eq!(bs.score(earlier), 10);
    }

    #[test]
    fn throttle_and_ban_thresholds() {
        let mut bs = BanScore::new();
        let t0 = Instant::now();
        bs.add(t0, 49);
        assert!(!bs.should_throttle(t0));
        bs.add(t0, 1);
        assert!(bs.should_throttle(t0));
        assert!(!bs.should_ban(t0));
        bs.add(t0, 50);
        assert!(bs.should_ban(t0));
    }
}
