//! Rate Limiter: a token bucket per `(kind, user)` key, with continuous
//! refill keyed off elapsed wall time rather than a tick task — the teacher
//! has no rate limiting of its own, so this is grounded on the generic
//! token-bucket shape the pack's `signal-fish-server` reference files assume
//! (`RateLimitInfo` in its protocol types) generalized into an actual
//! `tryConsume` implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub max_tokens: f64,
    pub refill_per_second: f64,
    pub burst_size: f64,
}

/// The two preconfigured buckets.
pub const ICE_CANDIDATE: BucketConfig = BucketConfig {
    max_tokens: 100.0,
    refill_per_second: 50.0,
    burst_size: 100.0,
};
pub const GAME_EVENT: BucketConfig = BucketConfig {
    max_tokens: 10.0,
    refill_per_second: 5.0,
    burst_size: 10.0,
};

struct Bucket {
    tokens: f64,
    config: BucketConfig,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: BucketConfig) -> Self {
        Bucket {
            tokens: config.max_tokens,
            config,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        let refilled = self.tokens + elapsed * self.config.refill_per_second;
        self.tokens = refilled.min(self.config.burst_size);
    }

    fn try_consume(&mut self, n: f64) -> bool {
        self.refill();
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// `key` is conventionally `"{kind}_{user}"`, keyed by authenticated
    /// `userId` (not socket-id) so a reconnect doesn't reset the bucket.
    pub fn try_consume(&self, key: &str, config: BucketConfig, n: f64) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(config));
        bucket.try_consume(n)
    }

    /// Releases a user's buckets on disconnect.
    pub fn release_user(&self, user_id: &str) {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets.retain(|key, _| !key.ends_with(&format!("_{user_id}")));
    }
}

pub fn key(kind: &str, user_id: &str) -> String {
    format!("{kind}_{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn burst_then_exhaustion() {
        let limiter = RateLimiter::default();
        let k = key("ice_candidate", "u1");
        let mut successes = 0;
        for _ in 0..150 {
            if limiter.try_consume(&k, ICE_CANDIDATE, 1.0) {
                successes += 1;
            }
        }
        assert_eq!(successes, 100);
    }

    #[test]
    fn refill_allows_more_after_time_passes() {
        let limiter = RateLimiter::default();
        let k = key("game_event", "u1");
        for _ in 0..10 {
            assert!(limiter.try_consume(&k, GAME_EVENT, 1.0));
        }
        assert!(!limiter.try_consume(&k, GAME_EVENT, 1.0));
        sleep(Duration::from_millis(250));
        assert!(limiter.try_consume(&k, GAME_EVENT, 1.0));
    }

    #[test]
    fn release_user_clears_buckets() {
        let limiter = RateLimiter::default();
        let k = key("ice_candidate", "u1");
        limiter.try_consume(&k, ICE_CANDIDATE, 100.0);
        limiter.release_user("u1");
        assert!(limiter.try_consume(&k, ICE_CANDIDATE, 1.0));
    }
}
