//! # Geowatch Core
//!
//! Upstream fan-out and resilience layer for the geowatch disaster
//! gateway: five heterogeneous feed adapters merged into one normalized
//! event catalog behind per-source caches, circuit breakers, and bounded
//! retries.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Upstream decoders (USGS, NASA EONET, GDACS, ReliefWeb, NWS) |
//! | [`aggregator`] | Parallel fan-out, cross-source dedup, ranking |
//! | [`cache`] | Per-source and combined TTL cache slots |
//! | [`circuit_breaker`] | Per-source failure isolation |
//! | [`config`] | Timing and resilience knobs |
//! | [`domain`] | Normalized event model and timestamps |
//! | [`error`] | Fetch error taxonomy |
//! | [`http_client`] | Transport abstraction over reqwest |
//! | [`introspection`] | Operator views and reset operations |
//! | [`pipeline`] | Per-source serve-fresh / serve-stale / fetch decision |
//! | [`retry`] | Bounded retry with exponential backoff |
//! | [`stats`] | Process-wide fetch counters |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use geowatch_core::{Aggregator, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let aggregator = Aggregator::new(GatewayConfig::default());
//!     let outcome = aggregator.fetch_all(false).await;
//!     println!("{} active events", outcome.disasters.len());
//! }
//! ```
//!
//! ## Failure model
//!
//! A single upstream failing never fails the merged request: its pipeline
//! serves stale data while usable, its breaker opens after repeated
//! failures, and the aggregator folds whatever the remaining sources
//! produced. Only an all-sources failure with no stale combined batch
//! surfaces as an error to the HTTP layer.

pub mod adapters;
pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod introspection;
pub mod pipeline;
pub mod retry;
pub mod stats;

pub use adapters::{
    EonetAdapter, GdacsAdapter, NwsAdapter, ReliefWebAdapter, SourceAdapter, UsgsAdapter,
};
pub use aggregator::{AggregateOutcome, Aggregator, SourceOutcome};
pub use cache::{CacheSlot, SlotStatus};
pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use config::{BreakerPolicy, ConfigSnapshot, GatewayConfig, RetryPolicy};
pub use domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
pub use error::FetchError;
pub use http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use introspection::{CacheStatusView, SourceStatus};
pub use pipeline::{Provenance, SourceBatch, SourcePipeline};
pub use retry::RetryingFetcher;
pub use stats::{GatewayStats, SourceStatsSnapshot, StatsSnapshot};
