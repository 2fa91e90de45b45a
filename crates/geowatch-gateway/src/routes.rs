use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use geowatch_core::{AggregateOutcome, EventKind, UpstreamId};

use crate::error::ApiError;
use crate::state::AppState;

const VALID_APIS: [&str; 5] = ["usgs", "nasa", "gdacs", "reliefweb", "nws"];

/// Directory of the bundled browser client, served at the root.
const PUBLIC_DIR: &str = "public";

pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(PUBLIC_DIR).not_found_service(not_found.into_service());

    Router::new()
        .route("/api/disasters", get(all_disasters))
        .route("/api/disasters/earthquakes", get(earthquakes))
        .route("/api/disasters/weather", get(weather))
        .route("/api/disasters/stats", get(disaster_stats))
        .route("/api/disasters/refresh", post(refresh))
        .route("/api/safe-zones", get(safe_zones))
        .route("/api/sources", get(sources))
        .route("/api/cache/status", get(cache_status))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/clear", post(clear_all_caches))
        .route("/api/cache/clear/:api", post(clear_one_cache))
        .route("/api/cache/stats/reset", post(reset_stats))
        .route("/api/circuit-breaker/reset", post(reset_all_breakers))
        .route("/api/circuit-breaker/reset/:api", post(reset_one_breaker))
        .route("/health", get(health))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

/// Catalog fetch shared by the aggregate and filter handlers. Surfaces a
/// 500 only when every source failed and no stale batch could stand in.
async fn catalog(state: &AppState) -> Result<AggregateOutcome, ApiError> {
    let outcome = state.aggregator.fetch_all(false).await;
    if outcome.total_failure() {
        let detail = outcome
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_deref())
            .next()
            .unwrap_or("all upstream sources failed")
            .to_owned();
        return Err(ApiError::unavailable(detail));
    }
    Ok(outcome)
}

async fn all_disasters(State(state): State<AppState>) -> Result<Response, ApiError> {
    let outcome = catalog(&state).await?;
    let total = outcome.disasters.len();
    let body = json!({
        "disasters": outcome.disasters,
        "safeZones": &*state.safe_zones,
        "meta": {
            "timestamp": outcome.timestamp,
            "totalDisasters": total,
            "totalSafeZones": state.safe_zones.len(),
            "sources": outcome.source_labels(),
        }
    });

    Ok((
        [(header::CACHE_CONTROL, "public, max-age=60")],
        Json(body),
    )
        .into_response())
}

async fn earthquakes(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = catalog(&state).await?;
    let quakes: Vec<_> = outcome
        .disasters
        .into_iter()
        .filter(|event| event.kind == EventKind::Earthquake)
        .collect();
    let total = quakes.len();
    Ok(Json(json!({
        "disasters": quakes,
        "meta": {
            "timestamp": outcome.timestamp,
            "totalDisasters": total,
        }
    })))
}

async fn weather(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = catalog(&state).await?;
    let events: Vec<_> = outcome
        .disasters
        .into_iter()
        .filter(|event| event.kind.is_weather())
        .collect();
    let total = events.len();
    Ok(Json(json!({
        "disasters": events,
        "meta": {
            "timestamp": outcome.timestamp,
            "totalDisasters": total,
        }
    })))
}

async fn disaster_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = catalog(&state).await?;

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_source: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut critical = 0usize;
    let mut warning = 0usize;
    let mut minor = 0usize;

    for event in &outcome.disasters {
        *by_type.entry(kind_name(event.kind)).or_default() += 1;
        *by_source.entry(event.source.label()).or_default() += 1;
        match event.severity {
            8.. => critical += 1,
            5..=7 => warning += 1,
            _ => minor += 1,
        }
    }

    Ok(Json(json!({
        "total": outcome.disasters.len(),
        "byType": by_type,
        "bySeverity": {"critical": critical, "warning": warning, "minor": minor},
        "bySource": by_source,
        "timestamp": outcome.timestamp,
    })))
}

fn kind_name(kind: EventKind) -> String {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(name)) => name,
        _ => "other".to_owned(),
    }
}

async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.aggregator.fetch_all(true).await;
    if outcome.total_failure() {
        return Err(ApiError::unavailable("refresh failed on every source"));
    }
    Ok(Json(json!({
        "message": "Cache refreshed",
        "totalDisasters": outcome.disasters.len(),
        "sources": outcome.outcomes,
        "timestamp": outcome.timestamp,
    })))
}

async fn safe_zones(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "safeZones": &*state.safe_zones,
        "total": state.safe_zones.len(),
    }))
}

async fn sources(State(state): State<AppState>) -> Json<serde_json::Value> {
    let descriptors: Vec<_> = UpstreamId::ALL
        .into_iter()
        .map(|id| {
            let breaker = state.aggregator.breaker_snapshot(id);
            json!({
                "id": id.slug(),
                "name": id.label(),
                "description": source_description(id),
                "breaker": breaker,
            })
        })
        .collect();
    Json(json!({"sources": descriptors, "total": descriptors.len()}))
}

fn source_description(id: UpstreamId) -> &'static str {
    match id {
        UpstreamId::Usgs => "USGS earthquake feeds (daily all-quakes and significant-month GeoJSON)",
        UpstreamId::NasaEonet => "NASA EONET open natural-event catalog",
        UpstreamId::Gdacs => "Global Disaster Alert and Coordination System RSS feed",
        UpstreamId::ReliefWeb => "ReliefWeb humanitarian disaster listings",
        UpstreamId::Nws => "US National Weather Service active alerts",
    }
}

async fn cache_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.aggregator.cache_status().await;
    Json(serde_json::to_value(view).unwrap_or_else(|_| json!({})))
}

async fn cache_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.aggregator.stats_snapshot();
    Json(serde_json::to_value(snapshot).unwrap_or_else(|_| json!({})))
}

async fn clear_all_caches(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.aggregator.clear_all_caches().await;
    Json(json!({"message": "All caches cleared"}))
}

async fn clear_one_cache(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Response {
    match api.parse::<UpstreamId>() {
        Ok(source) => {
            state.aggregator.clear_cache(source).await;
            Json(json!({"message": format!("Cache cleared for {}", source.slug())})).into_response()
        }
        Err(()) => invalid_api(&api),
    }
}

async fn reset_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.aggregator.reset_stats();
    Json(json!({"message": "Stats reset"}))
}

async fn reset_all_breakers(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.aggregator.reset_all_breakers();
    Json(json!({"message": "All circuit breakers reset"}))
}

async fn reset_one_breaker(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Response {
    match api.parse::<UpstreamId>() {
        Ok(source) => {
            state.aggregator.reset_breaker(source);
            Json(json!({"message": format!("Circuit breaker reset for {}", source.slug())}))
                .into_response()
        }
        Err(()) => invalid_api(&api),
    }
}

fn invalid_api(api: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": format!("Unknown API '{api}'"),
            "validApis": VALID_APIS,
        })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.aggregator.cache_status().await;
    let sources: Vec<_> = view
        .sources
        .iter()
        .map(|status| {
            json!({
                "source": status.source,
                "breaker": status.breaker.state,
                "hasData": status.slot.has_data,
                "ageSeconds": status.slot.age_seconds,
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "uptimeSeconds": state.aggregator.uptime_seconds(),
        "combined": {
            "hasData": view.combined.has_data,
            "itemCount": view.combined.item_count,
            "isFresh": view.combined.is_fresh,
        },
        "sources": sources,
    }))
}
