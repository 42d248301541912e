//! Per-connection envelope rate limiting (GCRA via `governor`), grounded on
//! the gateway's per-IP auth rate limiter. The spec's Open Questions call
//! this out as a production addition it does not mandate; it is scoped per
//! connection rather than per IP since every connection already has its own
//! task and its own cheap limiter instance.

use std::num::NonZeroU32;

use governor::{clock::DefaultClock, state::direct::NotKeyed, state::InMemoryState, Quota, RateLimiter};

use crate::config::TrackerConfig;

pub struct EnvelopeLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl EnvelopeLimiter {
    pub fn new(config: &TrackerConfig) -> Self {
        let per_sec = NonZeroU32::new(config.envelope_rate_per_sec).unwrap_or(NonZeroU32::new(1).unwrap());
        let burst = NonZeroU32::new(config.envelope_burst).unwrap_or(per_sec);
        let quota = Quota::per_second(per_sec).allow_burst(burst);
        EnvelopeLimiter { limiter: RateLimiter::direct(quota) }
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_throttle() {
        let config = TrackerConfig { envelope_rate_per_sec: 1, envelope_burst: 2, ..TrackerConfig::default() };
        let limiter = EnvelopeLimiter::new(&config);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
