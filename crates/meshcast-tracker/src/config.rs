use std::time::Duration;

/// Tunables named in §6: stale threshold (3 min default), sweep period
/// (1 min default), plus the per-connection envelope rate limit the spec's
/// Open Questions call out as a production addition it does not mandate.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub stale_threshold: Duration,
    pub sweep_period: Duration,
    /// Envelopes per second a single connection may send before being
    /// throttled (burst-tolerant GCRA, see `rate_limit.rs`).
    pub envelope_rate_per_sec: u32,
    pub envelope_burst: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            stale_threshold: Duration::from_secs(180),
            sweep_period: Duration::from_secs(60),
            envelope_rate_per_sec: 50,
            envelope_burst: 100,
        }
    }
}
