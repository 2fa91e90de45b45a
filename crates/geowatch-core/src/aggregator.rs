use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapters::{
    EonetAdapter, GdacsAdapter, NwsAdapter, ReliefWebAdapter, SourceAdapter, UsgsAdapter,
};
use crate::cache::CacheSlot;
use crate::circuit_breaker::BreakerRegistry;
use crate::config::GatewayConfig;
use crate::domain::{DisasterEvent, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::pipeline::{Provenance, SourceBatch, SourcePipeline};
use crate::retry::RetryingFetcher;
use crate::stats::GatewayStats;

/// Two events of the same kind within this many degrees on both axes are
/// treated as one incident reported by different providers.
const DEDUP_WINDOW_DEG: f64 = 0.1;

/// Per-source result of one fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: UpstreamId,
    pub ok: bool,
    pub count: usize,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The merged catalog handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub disasters: Vec<DisasterEvent>,
    /// Per-source diagnostics; empty when the combined cache answered.
    pub outcomes: Vec<SourceOutcome>,
    pub timestamp: UtcDateTime,
    pub from_cache: bool,
}

impl AggregateOutcome {
    /// Distinct provider labels present in the merged list.
    pub fn source_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        for id in UpstreamId::ALL {
            if self.disasters.iter().any(|event| event.source == id) {
                labels.push(id.label());
            }
        }
        labels
    }

    /// True when nothing was produced and every source reported an error.
    pub fn total_failure(&self) -> bool {
        self.disasters.is_empty()
            && !self.outcomes.is_empty()
            && self.outcomes.iter().all(|outcome| !outcome.ok)
    }
}

/// Owns the five source pipelines, the combined cache, and the merge
/// policy. Constructed once at process start and shared behind an `Arc`.
pub struct Aggregator {
    pipelines: [Arc<SourcePipeline>; 5],
    combined: CacheSlot<DisasterEvent>,
    flight: Mutex<()>,
    breakers: Arc<BreakerRegistry>,
    stats: Arc<GatewayStats>,
    config: GatewayConfig,
}

impl Aggregator {
    /// Production constructor with the real transport and the five
    /// standard adapters.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_client(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_client(config: GatewayConfig, client: Arc<dyn HttpClient>) -> Self {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(UsgsAdapter::new(config.http_timeout)),
            Box::new(EonetAdapter::new(config.http_timeout)),
            Box::new(GdacsAdapter::new(config.http_timeout)),
            Box::new(ReliefWebAdapter::new(config.http_timeout)),
            Box::new(NwsAdapter::new(config.http_timeout)),
        ];
        Self::with_adapters(config, client, adapters)
    }

    /// Wire arbitrary adapters over an arbitrary transport. The adapter
    /// list must cover each upstream exactly once.
    pub fn with_adapters(
        config: GatewayConfig,
        client: Arc<dyn HttpClient>,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        assert_eq!(adapters.len(), 5, "one adapter per upstream source");

        let stats = Arc::new(GatewayStats::new());
        let breakers = Arc::new(BreakerRegistry::new(config.breaker));
        let fetcher = RetryingFetcher::new(client, config.retry, Arc::clone(&stats));

        let mut slots: [Option<Arc<SourcePipeline>>; 5] = Default::default();
        for adapter in adapters {
            let index = adapter.id().index();
            let pipeline = SourcePipeline::new(
                adapter,
                fetcher.clone(),
                Arc::clone(&breakers),
                Arc::clone(&stats),
                config,
            );
            assert!(
                slots[index].replace(Arc::new(pipeline)).is_none(),
                "duplicate adapter for one upstream source"
            );
        }

        Self {
            pipelines: slots.map(|slot| slot.expect("adapter list covers every upstream")),
            combined: CacheSlot::new(),
            flight: Mutex::new(()),
            breakers,
            stats,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> &Arc<GatewayStats> {
        &self.stats
    }

    pub(crate) fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub(crate) fn pipeline(&self, source: UpstreamId) -> &Arc<SourcePipeline> {
        &self.pipelines[source.index()]
    }

    pub(crate) fn combined_slot(&self) -> &CacheSlot<DisasterEvent> {
        &self.combined
    }

    /// Fetch the merged catalog without a caller deadline.
    pub async fn fetch_all(&self, force: bool) -> AggregateOutcome {
        self.fetch_all_with_deadline(force, None).await
    }

    /// Fetch the merged catalog. With a deadline, sources that have not
    /// settled by then fall back to their cached batches; the in-flight
    /// requests keep running and land in the per-source caches for later
    /// callers.
    pub async fn fetch_all_with_deadline(
        &self,
        force: bool,
        deadline: Option<Duration>,
    ) -> AggregateOutcome {
        let arrival = Instant::now();

        if !force {
            if let Some(disasters) = self.combined.fresh(self.config.cache_ttl).await {
                self.stats.record_cache_hit();
                return self.cached_outcome(disasters);
            }
        }

        let _guard = self.flight.lock().await;

        if let Some(disasters) = self.combined.stored_since(arrival).await {
            self.stats.record_cache_hit();
            return self.cached_outcome(disasters);
        }
        if !force {
            if let Some(disasters) = self.combined.fresh(self.config.cache_ttl).await {
                self.stats.record_cache_hit();
                return self.cached_outcome(disasters);
            }
        }

        let started = tokio::time::Instant::now();
        let handles = self.pipelines.clone().map(|pipeline| {
            tokio::spawn(async move { pipeline.request(force).await })
        });

        let mut merged = Vec::new();
        let mut outcomes = Vec::with_capacity(UpstreamId::ALL.len());
        for (id, handle) in UpstreamId::ALL.into_iter().zip(handles) {
            let settled = match deadline {
                Some(deadline) => tokio::time::timeout_at(started + deadline, handle).await.ok(),
                None => Some(handle.await),
            };

            let result = match settled {
                Some(Ok(result)) => result,
                Some(Err(join_error)) => {
                    Err(FetchError::network(format!("fan-out task failed: {join_error}")))
                }
                // Deadline expired before this source settled; serve its
                // cached batch if one exists. The spawned task continues
                // and refreshes the slot for the next caller.
                None => match self.pipeline(id).cached_any_age().await {
                    Some(events) => Ok(SourceBatch {
                        events,
                        provenance: Provenance::Cached,
                    }),
                    None => Err(FetchError::NoData {
                        source: id,
                        message: "deadline expired before the fetch settled".to_owned(),
                    }),
                },
            };

            match result {
                Ok(batch) => {
                    outcomes.push(SourceOutcome {
                        source: id,
                        ok: true,
                        count: batch.events.len(),
                        from_cache: batch.provenance.from_cache(),
                        error: None,
                    });
                    merged.extend(batch.events);
                }
                Err(error) => {
                    warn!(source = %id, error = %error, "source unavailable for this fan-out");
                    outcomes.push(SourceOutcome {
                        source: id,
                        ok: false,
                        count: 0,
                        from_cache: false,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        let mut disasters = dedup_cross_source(merged);
        rank(&mut disasters);
        assign_sequence_ids(&mut disasters);

        info!(
            total = disasters.len(),
            sources_ok = outcomes.iter().filter(|o| o.ok).count(),
            "fan-out complete"
        );

        if disasters.is_empty() {
            if let Some(stale) = self.combined.stale_usable(self.config.stale_ttl).await {
                self.stats.record_stale_serve();
                return AggregateOutcome {
                    disasters: stale,
                    outcomes,
                    timestamp: UtcDateTime::now(),
                    from_cache: true,
                };
            }
        }

        // An all-sources failure must not clobber an older usable batch.
        if outcomes.iter().any(|outcome| outcome.ok) {
            self.combined.store(disasters.clone()).await;
        }

        AggregateOutcome {
            disasters,
            outcomes,
            timestamp: UtcDateTime::now(),
            from_cache: false,
        }
    }

    fn cached_outcome(&self, disasters: Vec<DisasterEvent>) -> AggregateOutcome {
        AggregateOutcome {
            disasters,
            outcomes: Vec::new(),
            timestamp: UtcDateTime::now(),
            from_cache: true,
        }
    }
}

/// Collapse near-coincident reports of one incident: iterate in arrival
/// order and drop an event when an earlier-kept event has the same kind
/// and both coordinate deltas under the window.
pub fn dedup_cross_source(events: Vec<DisasterEvent>) -> Vec<DisasterEvent> {
    let mut kept: Vec<DisasterEvent> = Vec::with_capacity(events.len());
    for event in events {
        let duplicate = kept.iter().any(|earlier| {
            earlier.kind == event.kind
                && (earlier.lat - event.lat).abs() < DEDUP_WINDOW_DEG
                && (earlier.lng - event.lng).abs() < DEDUP_WINDOW_DEG
        });
        if !duplicate {
            kept.push(event);
        }
    }
    kept
}

/// Worst first; ties broken by recency.
pub fn rank(events: &mut [DisasterEvent]) {
    events.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

pub fn assign_sequence_ids(events: &mut [DisasterEvent]) {
    for (index, event) in events.iter_mut().enumerate() {
        event.sequence_id = index as u64 + 1;
    }
}
