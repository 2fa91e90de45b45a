use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::SourceAdapter;
use crate::domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::HttpRequest;
use crate::retry::RetryingFetcher;

const ALERTS_URL: &str = "https://api.weather.gov/alerts/active?status=actual&message_type=alert";

/// api.weather.gov rejects anonymous clients; the User-Agent must
/// identify the application and a contact.
const USER_AGENT: &str = "(geowatch, ops@geowatch.dev)";

/// Active alerts are plentiful; only the first batch is mapped.
const MAX_ALERTS: usize = 30;

/// National Weather Service active-alerts decoder.
pub struct NwsAdapter {
    url: String,
    timeout: Duration,
}

impl NwsAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            url: ALERTS_URL.to_owned(),
            timeout,
        }
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl SourceAdapter for NwsAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::Nws
    }

    fn fetch<'a>(
        &'a self,
        fetcher: &'a RetryingFetcher,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let request = HttpRequest::get(&self.url)
                .with_header("user-agent", USER_AGENT)
                .with_header("accept", "application/geo+json")
                .with_timeout(self.timeout);
            let response = fetcher.fetch(request).await?;
            decode(&response.body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct Feed {
    features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Point { coordinates: Vec<f64> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "areaDesc")]
    area_desc: Option<String>,
    #[serde(default)]
    effective: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

impl Geometry {
    /// Point coordinates directly; polygons collapse to the arithmetic
    /// mean of the outer ring's vertices (the ring is small enough that
    /// the naive mean lands inside the warned area).
    fn lng_lat(&self) -> Option<(f64, f64)> {
        match self {
            Self::Point { coordinates } => match coordinates.as_slice() {
                [lng, lat, ..] => Some((*lng, *lat)),
                _ => None,
            },
            Self::Polygon { coordinates } => {
                let ring = coordinates.first()?;
                let mut lng_sum = 0.0;
                let mut lat_sum = 0.0;
                let mut count = 0usize;
                for vertex in ring {
                    if let [lng, lat, ..] = vertex.as_slice() {
                        lng_sum += lng;
                        lat_sum += lat;
                        count += 1;
                    }
                }
                if count == 0 {
                    None
                } else {
                    Some((lng_sum / count as f64, lat_sum / count as f64))
                }
            }
            Self::Unsupported => None,
        }
    }
}

pub(crate) fn decode(body: &str) -> Result<Vec<DisasterEvent>, FetchError> {
    let feed: Feed = serde_json::from_str(body)
        .map_err(|e| FetchError::decode(format!("NWS alerts: {e}")))?;

    let mut events = Vec::new();
    for raw in feed.features {
        if events.len() >= MAX_ALERTS {
            break;
        }
        let Ok(feature) = serde_json::from_value::<Feature>(raw) else {
            continue;
        };
        let Some((lng, lat)) = feature.geometry.as_ref().and_then(Geometry::lng_lat) else {
            continue;
        };
        if !DisasterEvent::coordinates_valid(lat, lng) {
            continue;
        }

        let event_name = feature
            .properties
            .event
            .clone()
            .unwrap_or_else(|| "Weather Alert".to_owned());
        let kind = kind_for_event(&event_name);
        let severity_label = feature.properties.severity.clone();
        let timestamp = feature
            .properties
            .effective
            .as_deref()
            .and_then(UtcDateTime::parse_rfc3339)
            .unwrap_or_else(UtcDateTime::now);
        let source_id = feature
            .id
            .clone()
            .unwrap_or_else(|| format!("nws-{}-{}", event_name.replace(' ', "-"), timestamp.unix_timestamp()));

        events.push(DisasterEvent {
            sequence_id: 0,
            source_id,
            source: UpstreamId::Nws,
            kind,
            severity: severity_label.as_deref().map_or(5, severity_for_label),
            lat,
            lng,
            radius_m: kind.default_radius_m(),
            location: feature
                .properties
                .area_desc
                .unwrap_or_else(|| event_name.clone()),
            description: feature
                .properties
                .headline
                .or(feature.properties.description)
                .unwrap_or_else(|| event_name.clone()),
            timestamp,
            url: feature.id,
            extras: EventExtras {
                alert_level: severity_label,
                expires: feature.properties.expires,
                ..EventExtras::default()
            },
        });
    }
    Ok(events)
}

fn kind_for_event(event: &str) -> EventKind {
    let event = event.to_ascii_lowercase();
    let has = |needle: &str| event.contains(needle);

    if has("tornado") {
        EventKind::Tornado
    } else if has("hurricane") || has("tropical") {
        EventKind::Hurricane
    } else if has("flood") {
        EventKind::Flood
    } else if has("fire") {
        EventKind::Wildfire
    } else if has("earthquake") {
        EventKind::Earthquake
    } else if has("tsunami") {
        EventKind::Tsunami
    } else if has("winter") || has("blizzard") || has("snow") {
        EventKind::Snow
    } else if has("thunder") || has("storm") {
        EventKind::Thunderstorm
    } else if has("wind") {
        EventKind::Wind
    } else if has("heat") {
        EventKind::Heat
    } else {
        EventKind::Thunderstorm
    }
}

fn severity_for_label(label: &str) -> u8 {
    match label.trim().to_ascii_lowercase().as_str() {
        "extreme" => 10,
        "severe" => 8,
        "moderate" => 6,
        "minor" => 4,
        "unknown" => 5,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "features": [
            {
                "id": "https://api.weather.gov/alerts/urn:oid:1",
                "geometry": {"type": "Point", "coordinates": [-97.51, 35.47]},
                "properties": {
                    "event": "Tornado Warning",
                    "severity": "Extreme",
                    "headline": "Tornado Warning issued for Oklahoma County",
                    "areaDesc": "Oklahoma County, OK",
                    "effective": "2025-01-10T21:05:00-06:00",
                    "expires": "2025-01-10T21:45:00-06:00"
                }
            },
            {
                "id": "https://api.weather.gov/alerts/urn:oid:2",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-98.0, 34.0], [-97.0, 34.0], [-97.0, 35.0], [-98.0, 35.0]]]
                },
                "properties": {
                    "event": "Severe Thunderstorm Warning",
                    "severity": "Severe",
                    "areaDesc": "Cleveland County, OK"
                }
            },
            {
                "id": "https://api.weather.gov/alerts/urn:oid:3",
                "geometry": null,
                "properties": {"event": "Special Weather Statement", "severity": "Minor"}
            }
        ]
    }"#;

    #[test]
    fn keeps_point_and_polygon_features_only() {
        let events = decode(FIXTURE).expect("valid feed");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn point_alert_maps_directly() {
        let events = decode(FIXTURE).expect("valid feed");
        let tornado = &events[0];
        assert_eq!(tornado.kind, EventKind::Tornado);
        assert_eq!(tornado.severity, 10);
        assert_eq!(tornado.lat, 35.47);
        assert_eq!(tornado.lng, -97.51);
        assert_eq!(tornado.location, "Oklahoma County, OK");
        assert_eq!(tornado.radius_m, 15_000);
        assert!(tornado.extras.expires.is_some());
    }

    #[test]
    fn polygon_collapses_to_vertex_mean() {
        let events = decode(FIXTURE).expect("valid feed");
        let storm = &events[1];
        assert_eq!(storm.kind, EventKind::Thunderstorm);
        assert_eq!(storm.severity, 8);
        assert!((storm.lng - -97.5).abs() < 1e-9);
        assert!((storm.lat - 34.5).abs() < 1e-9);
    }

    #[test]
    fn alert_cap_bounds_output() {
        let feature = r#"{
            "id": "https://api.weather.gov/alerts/urn:oid:N",
            "geometry": {"type": "Point", "coordinates": [-97.0, 35.0]},
            "properties": {"event": "Flood Warning", "severity": "Moderate"}
        }"#;
        let body = format!(
            "{{\"features\": [{}]}}",
            std::iter::repeat(feature).take(40).collect::<Vec<_>>().join(",")
        );
        let events = decode(&body).expect("valid feed");
        assert_eq!(events.len(), 30);
    }

    #[test]
    fn unmatched_event_defaults_to_thunderstorm() {
        assert_eq!(kind_for_event("Dense Fog Advisory"), EventKind::Thunderstorm);
        assert_eq!(kind_for_event("Red Flag Fire Weather"), EventKind::Wildfire);
        assert_eq!(kind_for_event("High Wind Watch"), EventKind::Wind);
    }
}
