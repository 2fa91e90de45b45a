use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::SourceAdapter;
use crate::domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::HttpRequest;
use crate::retry::RetryingFetcher;

const EVENTS_URL: &str = "https://eonet.gsfc.nasa.gov/api/v2.1/events";

/// NASA EONET open-events decoder.
pub struct EonetAdapter {
    url: String,
    timeout: Duration,
}

impl EonetAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            url: EVENTS_URL.to_owned(),
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

impl SourceAdapter for EonetAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::NasaEonet
    }

    fn fetch<'a>(
        &'a self,
        fetcher: &'a RetryingFetcher,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DisasterEvent>, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let response = fetcher
                .fetch(HttpRequest::get(&self.url).with_timeout(self.timeout))
                .await?;
            decode(&response.body)
        })
    }
}

#[derive(Debug, Deserialize)]
struct Feed {
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    geometry: Vec<GeometryEntry>,
}

#[derive(Debug, Deserialize)]
struct Category {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct GeometryEntry {
    #[serde(default)]
    date: Option<String>,
    coordinates: Coordinates,
}

/// EONET emits `[lng, lat]` for Point geometry and `[[lng, lat], ...]`
/// for tracks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinates {
    Point(Vec<f64>),
    Track(Vec<Vec<f64>>),
}

impl Coordinates {
    fn lng_lat(&self) -> Option<(f64, f64)> {
        let pair = match self {
            Self::Point(pair) => pair.as_slice(),
            Self::Track(track) => track.first()?.as_slice(),
        };
        match pair {
            [lng, lat, ..] => Some((*lng, *lat)),
            _ => None,
        }
    }
}

pub(crate) fn decode(body: &str) -> Result<Vec<DisasterEvent>, FetchError> {
    let feed: Feed = serde_json::from_str(body)
        .map_err(|e| FetchError::decode(format!("EONET events: {e}")))?;

    let mut events = Vec::with_capacity(feed.events.len());
    for raw in feed.events {
        let Ok(event) = serde_json::from_value::<Event>(raw) else {
            continue;
        };
        // The latest geometry entry carries the current position.
        let Some(geometry) = event.geometry.last() else {
            continue;
        };
        let Some((lng, lat)) = geometry.coordinates.lng_lat() else {
            continue;
        };
        if !DisasterEvent::coordinates_valid(lat, lng) {
            continue;
        }

        let category = event.categories.first().map(|c| c.id);
        let kind = category.map_or(EventKind::Other, kind_for_category);
        let timestamp = geometry
            .date
            .as_deref()
            .and_then(UtcDateTime::parse_rfc3339)
            .unwrap_or_else(UtcDateTime::now);

        events.push(DisasterEvent {
            sequence_id: 0,
            source_id: event.id,
            source: UpstreamId::NasaEonet,
            kind,
            severity: category.map_or(5, severity_for_category),
            lat,
            lng,
            radius_m: kind.default_radius_m(),
            location: event.title.clone(),
            description: event.title,
            timestamp,
            url: event.link,
            extras: EventExtras::default(),
        });
    }
    Ok(events)
}

fn kind_for_category(category: i64) -> EventKind {
    match category {
        6 => EventKind::Drought,
        7 => EventKind::DustHaze,
        8 => EventKind::Wildfire,
        9 | 13 => EventKind::Flood,
        10 => EventKind::Hurricane,
        12 => EventKind::Volcano,
        14 => EventKind::Landslide,
        15 => EventKind::SeaLakeIce,
        16 => EventKind::Earthquake,
        17 => EventKind::Snow,
        18 => EventKind::Temperature,
        _ => EventKind::Other,
    }
}

fn severity_for_category(category: i64) -> u8 {
    match category {
        10 => 9,
        8 | 12 => 8,
        16 => 7,
        9 => 6,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "events": [
            {
                "id": "EONET_9001",
                "title": "Wildfire - NSW",
                "categories": [{"id": 8, "title": "Wildfires"}],
                "geometry": [
                    {"date": "2025-01-01T00:00:00Z", "coordinates": [150.0, -33.0]},
                    {"date": "2025-01-02T00:00:00Z", "coordinates": [151.2093, -33.8688]}
                ]
            },
            {
                "id": "EONET_9002",
                "title": "Tropical Cyclone Track",
                "categories": [{"id": 10, "title": "Severe Storms"}],
                "geometry": [
                    {"date": "2025-01-03T06:00:00Z", "coordinates": [[160.5, -18.2], [161.0, -18.9]]}
                ]
            },
            {
                "id": "EONET_9003",
                "title": "No Position",
                "categories": [{"id": 12}],
                "geometry": []
            }
        ]
    }"#;

    #[test]
    fn picks_latest_geometry_entry() {
        let events = decode(FIXTURE).expect("valid feed");
        let fire = &events[0];
        assert_eq!(fire.kind, EventKind::Wildfire);
        assert_eq!(fire.severity, 8);
        assert_eq!(fire.lat, -33.8688);
        assert_eq!(fire.lng, 151.2093);
        assert_eq!(fire.radius_m, 25_000);
        assert_eq!(fire.location, "Wildfire - NSW");
    }

    #[test]
    fn track_geometry_uses_first_inner_pair() {
        let events = decode(FIXTURE).expect("valid feed");
        let storm = &events[1];
        assert_eq!(storm.kind, EventKind::Hurricane);
        assert_eq!(storm.severity, 9);
        assert_eq!(storm.lat, -18.2);
        assert_eq!(storm.lng, 160.5);
    }

    #[test]
    fn events_without_geometry_are_dropped() {
        let events = decode(FIXTURE).expect("valid feed");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn unknown_category_maps_to_other_with_default_severity() {
        assert_eq!(kind_for_category(99), EventKind::Other);
        assert_eq!(severity_for_category(99), 5);
        assert_eq!(kind_for_category(13), EventKind::Flood);
    }
}
