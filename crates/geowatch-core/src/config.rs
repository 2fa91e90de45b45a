use std::time::Duration;

use serde::Serialize;

/// Retry schedule for upstream requests.
///
/// `attempts` is the total attempt count (not a retry count); the delay
/// before attempt k+1 is `base_delay * 2^(k-1)`, so 1s, 2s, 4s with the
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let scale = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(scale)
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

/// Timing and resilience knobs for the whole gateway core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// A cache slot younger than this serves without a network attempt.
    pub cache_ttl: Duration,
    /// A slot younger than this may still be served when fetching fails.
    pub stale_ttl: Duration,
    /// Hard wall-clock deadline per upstream HTTP request.
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            stale_ttl: Duration::from_secs(30 * 60),
            http_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            breaker: BreakerPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Serializable view of the configured constants for the status API.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            cache_ttl_secs: self.cache_ttl.as_secs(),
            stale_ttl_secs: self.stale_ttl.as_secs(),
            http_timeout_secs: self.http_timeout.as_secs(),
            retry_attempts: self.retry.attempts,
            retry_base_delay_ms: self.retry.base_delay.as_millis() as u64,
            breaker_threshold: self.breaker.failure_threshold,
            breaker_timeout_secs: self.breaker.open_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub cache_ttl_secs: u64,
    pub stale_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn default_config_matches_reference_timings() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.stale_ttl, Duration::from_secs(1800));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.open_timeout, Duration::from_secs(60));
    }
}
