use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapters::SourceAdapter;
use crate::cache::{CacheSlot, SlotStatus};
use crate::circuit_breaker::BreakerRegistry;
use crate::config::GatewayConfig;
use crate::domain::{DisasterEvent, UpstreamId};
use crate::error::FetchError;
use crate::retry::RetryingFetcher;
use crate::stats::GatewayStats;

/// Where a returned batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Decoded from a network fetch completed by this call.
    Live,
    /// Served from cache (fresh, coalesced onto another caller's fetch,
    /// or any-age under an open breaker).
    Cached,
    /// Stale data served because the fetch behind it failed.
    Stale,
}

impl Provenance {
    pub const fn from_cache(self) -> bool {
        !matches!(self, Self::Live)
    }
}

/// One source's batch plus its provenance.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub events: Vec<DisasterEvent>,
    pub provenance: Provenance,
}

/// Composes one adapter with its cache slot, breaker, and the retrying
/// fetcher, and applies the serve-fresh / serve-stale / fetch decision.
pub struct SourcePipeline {
    adapter: Box<dyn SourceAdapter>,
    fetcher: RetryingFetcher,
    cache: CacheSlot<DisasterEvent>,
    breakers: Arc<BreakerRegistry>,
    stats: Arc<GatewayStats>,
    config: GatewayConfig,
    /// Single-flight guard: at most one network attempt per source at a
    /// time; waiting callers pick up the winner's result from the cache.
    flight: Mutex<()>,
}

impl SourcePipeline {
    pub fn new(
        adapter: Box<dyn SourceAdapter>,
        fetcher: RetryingFetcher,
        breakers: Arc<BreakerRegistry>,
        stats: Arc<GatewayStats>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            cache: CacheSlot::new(),
            breakers,
            stats,
            config,
            flight: Mutex::new(()),
        }
    }

    pub fn id(&self) -> UpstreamId {
        self.adapter.id()
    }

    /// Fetch this source's events, honoring cache freshness, the breaker,
    /// and the stale fallback. `force` skips only the freshness fast-path;
    /// an open breaker with cached data still short-circuits.
    pub async fn request(&self, force: bool) -> Result<SourceBatch, FetchError> {
        let id = self.id();
        let arrival = Instant::now();

        if !force {
            if let Some(events) = self.cache.fresh(self.config.cache_ttl).await {
                self.stats.record_cache_hit();
                debug!(source = %id, "serving fresh cache");
                return Ok(SourceBatch {
                    events,
                    provenance: Provenance::Cached,
                });
            }
        }

        let _guard = self.flight.lock().await;

        // Another caller may have completed a fetch while we waited on
        // the guard; its result is ours too.
        if let Some(events) = self.cache.stored_since(arrival).await {
            self.stats.record_cache_hit();
            return Ok(SourceBatch {
                events,
                provenance: Provenance::Cached,
            });
        }
        if !force {
            if let Some(events) = self.cache.fresh(self.config.cache_ttl).await {
                self.stats.record_cache_hit();
                return Ok(SourceBatch {
                    events,
                    provenance: Provenance::Cached,
                });
            }
        }

        let breaker = self.breakers.get(id);
        if !breaker.allow_request() {
            return match self.cache.any_age().await {
                Some(events) => {
                    debug!(source = %id, "breaker open, serving cached data");
                    Ok(SourceBatch {
                        events,
                        provenance: Provenance::Cached,
                    })
                }
                None => Err(FetchError::BreakerOpen { source: id }),
            };
        }

        self.stats.record_fetch_attempt();
        match self.adapter.fetch(&self.fetcher).await {
            Ok(events) => {
                breaker.record_success();
                self.stats.record_success(id);
                self.cache.store(events.clone()).await;
                Ok(SourceBatch {
                    events,
                    provenance: Provenance::Live,
                })
            }
            Err(error) => {
                breaker.record_failure();
                self.stats.record_failure(id, &error.to_string());
                warn!(source = %id, error = %error, "source fetch failed");

                match self.cache.stale_usable(self.config.stale_ttl).await {
                    Some(events) => {
                        self.stats.record_stale_serve();
                        Ok(SourceBatch {
                            events,
                            provenance: Provenance::Stale,
                        })
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// Cached batch of any age, for deadline-expired partial aggregation.
    pub async fn cached_any_age(&self) -> Option<Vec<DisasterEvent>> {
        self.cache.any_age().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub async fn cache_status(&self) -> SlotStatus {
        self.cache
            .status(self.config.cache_ttl, self.config.stale_ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::config::{BreakerPolicy, RetryPolicy};
    use crate::domain::{EventExtras, EventKind, UtcDateTime};
    use crate::http_client::{HttpClient, HttpRequest, HttpResponse};

    /// Adapter double that replays scripted outcomes and counts upstream
    /// calls, bypassing the transport entirely.
    struct ScriptedAdapter {
        outcomes: StdMutex<VecDeque<Result<Vec<DisasterEvent>, FetchError>>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(outcomes: Vec<Result<Vec<DisasterEvent>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: StdMutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SourceAdapter for Arc<ScriptedAdapter> {
        fn id(&self) -> UpstreamId {
            UpstreamId::Usgs
        }

        fn fetch<'a>(
            &'a self,
            _fetcher: &'a RetryingFetcher,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.outcomes
                    .lock()
                    .expect("script lock")
                    .pop_front()
                    .unwrap_or_else(|| Err(FetchError::network("script exhausted")))
            })
        }
    }

    struct NeverClient;

    impl HttpClient for NeverClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, FetchError>> + Send + 'a>> {
            Box::pin(async { Err(FetchError::network("transport must not be reached")) })
        }
    }

    fn sample_event(source_id: &str) -> DisasterEvent {
        DisasterEvent {
            sequence_id: 0,
            source_id: source_id.to_owned(),
            source: UpstreamId::Usgs,
            kind: EventKind::Earthquake,
            severity: 7,
            lat: 35.0,
            lng: 139.0,
            radius_m: 50_000,
            location: "Test Region".to_owned(),
            description: "test".to_owned(),
            timestamp: UtcDateTime::now(),
            url: None,
            extras: EventExtras::default(),
        }
    }

    fn build_pipeline(
        adapter: Arc<ScriptedAdapter>,
        config: GatewayConfig,
    ) -> (Arc<SourcePipeline>, Arc<GatewayStats>) {
        let stats = Arc::new(GatewayStats::new());
        let fetcher = RetryingFetcher::new(
            Arc::new(NeverClient),
            RetryPolicy {
                attempts: 1,
                base_delay: Duration::from_millis(1),
            },
            Arc::clone(&stats),
        );
        let pipeline = SourcePipeline::new(
            Box::new(adapter),
            fetcher,
            Arc::new(BreakerRegistry::new(config.breaker)),
            Arc::clone(&stats),
            config,
        );
        (Arc::new(pipeline), stats)
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            cache_ttl: Duration::from_secs(60),
            stale_ttl: Duration::from_secs(600),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_the_network() {
        let adapter = ScriptedAdapter::new(vec![Ok(vec![sample_event("a")])]);
        let (pipeline, stats) = build_pipeline(Arc::clone(&adapter), test_config());

        let first = pipeline.request(false).await.expect("first fetch");
        assert_eq!(first.provenance, Provenance::Live);

        for _ in 0..3 {
            let again = pipeline.request(false).await.expect("cached");
            assert_eq!(again.provenance, Provenance::Cached);
            assert_eq!(again.events.len(), 1);
        }

        assert_eq!(adapter.calls(), 1);
        assert_eq!(stats.snapshot().cache_hits, 3);
    }

    #[tokio::test]
    async fn failure_with_stale_data_serves_stale_once_per_failure() {
        let config = GatewayConfig {
            cache_ttl: Duration::from_millis(20),
            stale_ttl: Duration::from_secs(600),
            ..GatewayConfig::default()
        };
        let adapter = ScriptedAdapter::new(vec![
            Ok(vec![sample_event("a")]),
            Err(FetchError::network("feed down")),
        ]);
        let (pipeline, stats) = build_pipeline(Arc::clone(&adapter), config);

        pipeline.request(false).await.expect("warm the cache");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let stale = pipeline.request(false).await.expect("stale fallback");
        assert_eq!(stale.provenance, Provenance::Stale);
        assert_eq!(stale.events[0].source_id, "a");
        assert_eq!(stats.stale_serve_count(), 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sources[0].failure_count, 1);
        assert!(snapshot.sources[0]
            .last_error
            .as_deref()
            .expect("recorded")
            .contains("feed down"));
    }

    #[tokio::test]
    async fn failure_without_usable_cache_propagates() {
        let adapter = ScriptedAdapter::new(vec![Err(FetchError::network("cold failure"))]);
        let (pipeline, _) = build_pipeline(adapter, test_config());

        let error = pipeline.request(false).await.expect_err("no fallback");
        assert!(matches!(error, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_blocks_network() {
        let config = GatewayConfig {
            breaker: BreakerPolicy {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(60),
            },
            ..test_config()
        };
        let outcomes = (0..5)
            .map(|_| Err(FetchError::Status {
                status: 502,
                reason: "Bad Gateway".to_owned(),
            }))
            .collect();
        let adapter = ScriptedAdapter::new(outcomes);
        let (pipeline, _) = build_pipeline(Arc::clone(&adapter), config);

        for _ in 0..5 {
            let _ = pipeline.request(true).await;
        }
        assert_eq!(adapter.calls(), 5);

        // Breaker now open with no cached data: refused locally.
        let error = pipeline.request(true).await.expect_err("breaker open");
        assert!(matches!(error, FetchError::BreakerOpen { .. }));
        assert_eq!(adapter.calls(), 5);
    }

    #[tokio::test]
    async fn open_breaker_serves_cached_data_even_when_forced() {
        let config = GatewayConfig {
            cache_ttl: Duration::from_millis(10),
            breaker: BreakerPolicy {
                failure_threshold: 1,
                open_timeout: Duration::from_secs(60),
            },
            ..test_config()
        };
        let adapter = ScriptedAdapter::new(vec![
            Ok(vec![sample_event("warm")]),
            Err(FetchError::network("down")),
        ]);
        let (pipeline, _) = build_pipeline(Arc::clone(&adapter), config);

        pipeline.request(false).await.expect("warm");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = pipeline.request(false).await; // trips the breaker

        let served = pipeline.request(true).await.expect("cached under breaker");
        assert_eq!(served.provenance, Provenance::Cached);
        assert_eq!(served.events[0].source_id, "warm");
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_cold_callers_coalesce_onto_one_fetch() {
        let adapter = ScriptedAdapter::new(vec![Ok(vec![sample_event("only")])]);
        let (pipeline, _) = build_pipeline(Arc::clone(&adapter), test_config());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move { pipeline.request(false).await }));
        }

        for handle in handles {
            let batch = handle.await.expect("task").expect("result");
            assert_eq!(batch.events.len(), 1);
            assert_eq!(batch.events[0].source_id, "only");
        }
        assert_eq!(adapter.calls(), 1);
    }
}
