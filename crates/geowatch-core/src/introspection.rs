//! Read-only operator views of cache ages, breaker states, and counters,
//! plus the imperative reset operations. Everything here is safe to call
//! while fan-outs are in flight: each slot and breaker snapshots under
//! its own lock.

use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::cache::SlotStatus;
use crate::circuit_breaker::BreakerSnapshot;
use crate::config::ConfigSnapshot;
use crate::domain::UpstreamId;
use crate::stats::StatsSnapshot;

/// One upstream's cache slot plus its breaker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: &'static str,
    #[serde(flatten)]
    pub slot: SlotStatus,
    pub breaker: BreakerSnapshot,
}

/// Full cache/breaker view for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusView {
    pub sources: Vec<SourceStatus>,
    pub combined: SlotStatus,
    pub config: ConfigSnapshot,
}

impl Aggregator {
    pub async fn cache_status(&self) -> CacheStatusView {
        let mut sources = Vec::with_capacity(UpstreamId::ALL.len());
        for id in UpstreamId::ALL {
            sources.push(SourceStatus {
                source: id.slug(),
                slot: self.pipeline(id).cache_status().await,
                breaker: self.breakers().get(id).snapshot(),
            });
        }

        let config = self.config();
        CacheStatusView {
            sources,
            combined: self
                .combined_slot()
                .status(config.cache_ttl, config.stale_ttl)
                .await,
            config: config.snapshot(),
        }
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats().snapshot()
    }

    pub fn breaker_snapshot(&self, source: UpstreamId) -> BreakerSnapshot {
        self.breakers().get(source).snapshot()
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.stats().uptime_seconds()
    }

    pub async fn clear_cache(&self, source: UpstreamId) {
        self.pipeline(source).clear_cache().await;
    }

    /// Clears every source slot and the combined slot.
    pub async fn clear_all_caches(&self) {
        for id in UpstreamId::ALL {
            self.pipeline(id).clear_cache().await;
        }
        self.combined_slot().clear().await;
    }

    pub fn reset_breaker(&self, source: UpstreamId) {
        self.breakers().reset(source);
    }

    pub fn reset_all_breakers(&self) {
        self.breakers().reset_all();
    }

    pub fn reset_stats(&self) {
        self.stats().reset();
    }
}
