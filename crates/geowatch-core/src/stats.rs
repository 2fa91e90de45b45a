use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::domain::{UpstreamId, UtcDateTime};

#[derive(Debug, Default, Clone)]
struct SourceTally {
    success: u64,
    failure: u64,
    last_error: Option<String>,
}

/// Process-wide fetch counters, shared by every pipeline and the aggregator.
///
/// Counter increments are atomic; the per-source tallies sit behind their
/// own locks so a status read always sees a consistent (count, last_error)
/// pair.
#[derive(Debug)]
pub struct GatewayStats {
    total_fetches: AtomicU64,
    cache_hits: AtomicU64,
    stale_serves: AtomicU64,
    successful_fetches: AtomicU64,
    retry_successes: AtomicU64,
    per_source: [Mutex<SourceTally>; 5],
    started_at: UtcDateTime,
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            total_fetches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            successful_fetches: AtomicU64::new(0),
            retry_successes: AtomicU64::new(0),
            per_source: Default::default(),
            started_at: UtcDateTime::now(),
        }
    }

    pub fn record_fetch_attempt(&self) {
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_serve(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_success(&self) {
        self.retry_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, source: UpstreamId) {
        self.successful_fetches.fetch_add(1, Ordering::Relaxed);
        let mut tally = self.per_source[source.index()]
            .lock()
            .expect("stats lock is not poisoned");
        tally.success += 1;
    }

    pub fn record_failure(&self, source: UpstreamId, error: &str) {
        let mut tally = self.per_source[source.index()]
            .lock()
            .expect("stats lock is not poisoned");
        tally.failure += 1;
        tally.last_error = Some(error.to_owned());
    }

    pub fn reset(&self) {
        self.total_fetches.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.stale_serves.store(0, Ordering::Relaxed);
        self.successful_fetches.store(0, Ordering::Relaxed);
        self.retry_successes.store(0, Ordering::Relaxed);
        for slot in &self.per_source {
            let mut tally = slot.lock().expect("stats lock is not poisoned");
            *tally = SourceTally::default();
        }
    }

    pub fn stale_serve_count(&self) -> u64 {
        self.stale_serves.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.started_at
            .age_from(UtcDateTime::now())
            .whole_seconds()
            .max(0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let mut sources = Vec::with_capacity(UpstreamId::ALL.len());
        for id in UpstreamId::ALL {
            let tally = self.per_source[id.index()]
                .lock()
                .expect("stats lock is not poisoned");
            sources.push(SourceStatsSnapshot {
                source: id.slug(),
                success_count: tally.success,
                failure_count: tally.failure,
                last_error: tally.last_error.clone(),
            });
        }

        StatsSnapshot {
            total_fetches: self.total_fetches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            successful_fetches: self.successful_fetches.load(Ordering::Relaxed),
            retry_successes: self.retry_successes.load(Ordering::Relaxed),
            started_at: self.started_at,
            sources,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_fetches: u64,
    pub cache_hits: u64,
    pub stale_serves: u64,
    pub successful_fetches: u64,
    pub retry_successes: u64,
    pub started_at: UtcDateTime,
    pub sources: Vec<SourceStatsSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatsSnapshot {
    pub source: &'static str,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
