use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::config::BreakerPolicy;
use crate::domain::{UpstreamId, UtcDateTime};

/// Breaker state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    /// Monotonic clock for the open-timeout check.
    last_failure: Option<Instant>,
    /// Wall clock mirror of `last_failure` for status reads.
    last_failure_at: Option<UtcDateTime>,
    probe_in_flight: bool,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            last_failure_at: None,
            probe_in_flight: false,
        }
    }
}

/// Per-upstream failure isolation state machine.
///
/// Open-to-half-open is observed lazily: nothing runs in the background,
/// the first consultation after the timeout flips the state and claims
/// the single probe slot.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Consultation before a network attempt. `true` claims permission to
    /// issue the request; in half-open state only one caller at a time
    /// gets it.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
            BreakerState::Open => {
                let can_probe = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.policy.open_timeout)
                    .unwrap_or(true);

                if can_probe {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.last_failure_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(UtcDateTime::now());
        inner.probe_in_flight = false;

        if inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.policy.failure_threshold
        {
            inner.state = BreakerState::Open;
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        *inner = BreakerInner::default();
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker lock is not poisoned");
        BreakerSnapshot {
            state: inner.state,
            failures: inner.consecutive_failures,
            last_failure: inner.last_failure_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<UtcDateTime>,
}

/// One breaker per upstream, addressable by id.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: [CircuitBreaker; 5],
}

impl BreakerRegistry {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            breakers: [
                CircuitBreaker::new(policy),
                CircuitBreaker::new(policy),
                CircuitBreaker::new(policy),
                CircuitBreaker::new(policy),
                CircuitBreaker::new(policy),
            ],
        }
    }

    pub fn get(&self, source: UpstreamId) -> &CircuitBreaker {
        &self.breakers[source.index()]
    }

    pub fn reset(&self, source: UpstreamId) {
        self.breakers[source.index()].reset();
    }

    pub fn reset_all(&self) {
        for breaker in &self.breakers {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn policy(threshold: u32, timeout: Duration) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: threshold,
            open_timeout: timeout,
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(policy(5, Duration::from_secs(60)));

        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.snapshot().state, BreakerState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(policy(5, Duration::from_secs(60)));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.snapshot().failures, 0);
        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    }

    #[test]
    fn half_open_permits_a_single_probe() {
        let breaker = CircuitBreaker::new(policy(1, Duration::from_millis(1)));
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);

        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.allow_request());
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
        // Probe slot is taken until the outcome lands.
        assert!(!breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(policy(1, Duration::from_millis(1)));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn reset_returns_breaker_to_closed() {
        let registry = BreakerRegistry::new(policy(1, Duration::from_secs(60)));
        registry.get(UpstreamId::Gdacs).record_failure();
        assert_eq!(
            registry.get(UpstreamId::Gdacs).snapshot().state,
            BreakerState::Open
        );

        registry.reset(UpstreamId::Gdacs);
        let snapshot = registry.get(UpstreamId::Gdacs).snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failures, 0);
        assert!(snapshot.last_failure.is_none());
    }
}
