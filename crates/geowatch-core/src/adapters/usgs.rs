use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::adapters::SourceAdapter;
use crate::domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::HttpRequest;
use crate::retry::RetryingFetcher;

const DAILY_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson";
const SIGNIFICANT_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/significant_month.geojson";

/// Quakes below this magnitude are noise for a disaster map.
const MIN_MAGNITUDE: f64 = 2.5;

/// USGS earthquake decoder. Merges the daily all-quakes feed with the
/// monthly significant feed, deduplicating on the upstream feature id.
pub struct UsgsAdapter {
    daily_url: String,
    significant_url: String,
    timeout: Duration,
}

impl UsgsAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            daily_url: DAILY_URL.to_owned(),
            significant_url: SIGNIFICANT_URL.to_owned(),
            timeout,
        }
    }

    pub fn with_urls(
        daily_url: impl Into<String>,
        significant_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            daily_url: daily_url.into(),
            significant_url: significant_url.into(),
            timeout,
        }
    }

    fn request(&self, url: &str) -> HttpRequest {
        HttpRequest::get(url).with_timeout(self.timeout)
    }
}

impl SourceAdapter for UsgsAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::Usgs
    }

    fn fetch<'a>(
        &'a self,
        fetcher: &'a RetryingFetcher,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let (daily, significant) = tokio::join!(
                fetcher.fetch(self.request(&self.daily_url)),
                fetcher.fetch(self.request(&self.significant_url)),
            );

            // Either feed alone is enough; only a double failure is fatal.
            let mut bodies = Vec::with_capacity(2);
            match (daily, significant) {
                (Err(first), Err(_)) => return Err(first),
                (daily, significant) => {
                    for outcome in [daily, significant] {
                        match outcome {
                            Ok(response) => bodies.push(response.body),
                            Err(error) => {
                                warn!(source = "usgs", error = %error, "one USGS feed failed")
                            }
                        }
                    }
                }
            }

            let mut seen = HashSet::new();
            let mut events = Vec::new();
            for body in bodies {
                events.extend(decode(&body, &mut seen)?);
            }
            Ok(events)
        })
    }
}

#[derive(Debug, Deserialize)]
struct Feed {
    features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    mag: Option<f64>,
    place: Option<String>,
    time: Option<i64>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lng, lat, depth_km]`
    coordinates: Vec<f64>,
}

/// Decode one GeoJSON feed, skipping features already seen in `seen`.
pub(crate) fn decode(
    body: &str,
    seen: &mut HashSet<String>,
) -> Result<Vec<DisasterEvent>, FetchError> {
    let feed: Feed = serde_json::from_str(body)
        .map_err(|e| FetchError::decode(format!("USGS GeoJSON: {e}")))?;

    let mut events = Vec::with_capacity(feed.features.len());
    for raw in feed.features {
        let Ok(feature) = serde_json::from_value::<Feature>(raw) else {
            continue;
        };
        if !seen.insert(feature.id.clone()) {
            continue;
        }

        let Some(magnitude) = feature.properties.mag else {
            continue;
        };
        if magnitude < MIN_MAGNITUDE {
            continue;
        }

        let [lng, lat] = match feature.geometry.coordinates.as_slice() {
            [lng, lat, ..] => [*lng, *lat],
            _ => continue,
        };
        if !DisasterEvent::coordinates_valid(lat, lng) {
            continue;
        }
        let depth_km = feature.geometry.coordinates.get(2).copied().unwrap_or(0.0);

        let timestamp = feature
            .properties
            .time
            .and_then(UtcDateTime::from_unix_millis)
            .unwrap_or_else(UtcDateTime::now);

        events.push(DisasterEvent {
            sequence_id: 0,
            source_id: feature.id,
            source: UpstreamId::Usgs,
            kind: EventKind::Earthquake,
            severity: severity_for_magnitude(magnitude),
            lat,
            lng,
            radius_m: radius_for_magnitude(magnitude),
            location: feature
                .properties
                .place
                .unwrap_or_else(|| "Unknown Location".to_owned()),
            description: format!(
                "Magnitude {magnitude:.1} earthquake at {depth_km:.1} km depth"
            ),
            timestamp,
            url: feature.properties.url,
            extras: EventExtras {
                magnitude: Some(magnitude),
                ..EventExtras::default()
            },
        });
    }
    Ok(events)
}

fn severity_for_magnitude(magnitude: f64) -> u8 {
    if magnitude >= 8.0 {
        10
    } else if magnitude >= 7.0 {
        9
    } else if magnitude >= 6.0 {
        8
    } else if magnitude >= 5.0 {
        7
    } else if magnitude >= 4.0 {
        5
    } else if magnitude >= 3.0 {
        3
    } else {
        2
    }
}

/// Impact radius scales with magnitude: 10 km at M3, doubling per unit.
fn radius_for_magnitude(magnitude: f64) -> u32 {
    let meters = 10_000.0 * 2f64.powf(magnitude - 3.0);
    meters.round().clamp(1.0, u32::MAX as f64) as u32
}
