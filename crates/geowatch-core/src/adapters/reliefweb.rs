use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use crate::adapters::SourceAdapter;
use crate::domain::{DisasterEvent, EventExtras, EventKind, UpstreamId, UtcDateTime};
use crate::error::FetchError;
use crate::http_client::HttpRequest;
use crate::retry::RetryingFetcher;

const DISASTERS_URL: &str =
    "https://api.reliefweb.int/v1/disasters?appname=geowatch&profile=full&limit=50&sort[]=date:desc";

/// ReliefWeb humanitarian-crisis decoder.
pub struct ReliefWebAdapter {
    url: String,
    timeout: Duration,
}

impl ReliefWebAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            url: DISASTERS_URL.to_owned(),
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

impl SourceAdapter for ReliefWebAdapter {
    fn id(&self) -> UpstreamId {
        UpstreamId::ReliefWeb
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
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: Option<serde_json::Value>,
    fields: Fields,
}

#[derive(Debug, Deserialize)]
struct Fields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    date: Option<DateBlock>,
    #[serde(default)]
    primary_country: Option<PrimaryCountry>,
    #[serde(default)]
    primary_type: Option<PrimaryType>,
}

#[derive(Debug, Deserialize)]
struct DateBlock {
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrimaryCountry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct PrimaryType {
    #[serde(default)]
    name: Option<String>,
}

pub(crate) fn decode(body: &str) -> Result<Vec<DisasterEvent>, FetchError> {
    let feed: Feed = serde_json::from_str(body)
        .map_err(|e| FetchError::decode(format!("ReliefWeb disasters: {e}")))?;

    let mut events = Vec::with_capacity(feed.data.len());
    for raw in feed.data {
        let Ok(item) = serde_json::from_value::<Item>(raw) else {
            continue;
        };
        // Country centroid is the only position ReliefWeb offers; items
        // without one cannot be placed on the map.
        let Some(country) = item.fields.primary_country.as_ref() else {
            continue;
        };
        let Some(location) = country.location.as_ref() else {
            continue;
        };
        if location.lat == 0.0 && location.lon == 0.0 {
            continue;
        }
        if !DisasterEvent::coordinates_valid(location.lat, location.lon) {
            continue;
        }

        let kind = item
            .fields
            .primary_type
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .map_or(EventKind::Other, kind_for_type_name);
        let status = item.fields.status.clone();
        let title = item
            .fields
            .name
            .clone()
            .unwrap_or_else(|| "Humanitarian Crisis".to_owned());
        let timestamp = item
            .fields
            .date
            .as_ref()
            .and_then(|d| d.created.as_deref())
            .and_then(UtcDateTime::parse_rfc3339)
            .unwrap_or_else(UtcDateTime::now);
        let source_id = item
            .id
            .as_ref()
            .map(|id| format!("reliefweb-{}", id.to_string().trim_matches('"')))
            .unwrap_or_else(|| format!("reliefweb-{}", title.to_ascii_lowercase().replace(' ', "-")));

        events.push(DisasterEvent {
            sequence_id: 0,
            source_id,
            source: UpstreamId::ReliefWeb,
            kind,
            severity: status.as_deref().map_or(5, severity_for_status),
            lat: location.lat,
            lng: location.lon,
            radius_m: kind.default_radius_m(),
            location: country.name.clone().unwrap_or_else(|| title.clone()),
            description: title,
            timestamp,
            url: item.fields.url,
            extras: EventExtras {
                status,
                ..EventExtras::default()
            },
        });
    }
    Ok(events)
}

fn kind_for_type_name(name: &str) -> EventKind {
    let name = name.to_ascii_lowercase();
    let has = |needle: &str| name.contains(needle);

    if has("earthquake") {
        EventKind::Earthquake
    } else if has("flood") {
        EventKind::Flood
    } else if has("cyclone") || has("hurricane") || has("typhoon") {
        EventKind::Hurricane
    } else if has("volcano") {
        EventKind::Volcano
    } else if has("drought") {
        EventKind::Drought
    } else if has("fire") {
        EventKind::Wildfire
    } else if has("epidemic") || has("outbreak") {
        EventKind::Epidemic
    } else if has("conflict") || has("war") {
        EventKind::War
    } else if has("tornado") {
        EventKind::Tornado
    } else {
        EventKind::Other
    }
}

fn severity_for_status(status: &str) -> u8 {
    match status.trim().to_ascii_lowercase().as_str() {
        "alert" => 8,
        "ongoing" => 6,
        "past" => 3,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "data": [
            {
                "id": 52001,
                "fields": {
                    "name": "Tropical Cyclone Zeta - Fiji",
                    "status": "alert",
                    "url": "https://reliefweb.int/disaster/tc-2025-000001-fji",
                    "date": {"created": "2025-01-05T08:00:00+00:00"},
                    "primary_country": {
                        "name": "Fiji",
                        "location": {"lat": -17.7134, "lon": 178.065}
                    },
                    "primary_type": {"name": "Tropical Cyclone"}
                }
            },
            {
                "id": 52002,
                "fields": {
                    "name": "Cholera Outbreak - Somewhere",
                    "status": "ongoing",
                    "primary_country": {"name": "Nowhere"}
                }
            },
            {
                "id": 52003,
                "fields": {
                    "name": "Null Island Event",
                    "status": "ongoing",
                    "primary_country": {
                        "name": "Null Island",
                        "location": {"lat": 0.0, "lon": 0.0}
                    },
                    "primary_type": {"name": "Epidemic"}
                }
            }
        ]
    }"#;

    #[test]
    fn decodes_located_disasters_only() {
        let events = decode(FIXTURE).expect("valid feed");
        assert_eq!(events.len(), 1);

        let cyclone = &events[0];
        assert_eq!(cyclone.kind, EventKind::Hurricane);
        assert_eq!(cyclone.severity, 8);
        assert_eq!(cyclone.lat, -17.7134);
        assert_eq!(cyclone.lng, 178.065);
        assert_eq!(cyclone.location, "Fiji");
        assert_eq!(cyclone.source_id, "reliefweb-52001");
        assert_eq!(cyclone.extras.status.as_deref(), Some("alert"));
    }

    #[test]
    fn type_inference_matches_substrings_case_insensitively() {
        assert_eq!(kind_for_type_name("Flash Flood"), EventKind::Flood);
        assert_eq!(kind_for_type_name("TYPHOON"), EventKind::Hurricane);
        assert_eq!(kind_for_type_name("Wild Fire"), EventKind::Wildfire);
        assert_eq!(kind_for_type_name("Disease Outbreak"), EventKind::Epidemic);
        assert_eq!(kind_for_type_name("Armed Conflict"), EventKind::War);
        assert_eq!(kind_for_type_name("Cold Wave"), EventKind::Other);
    }

    #[test]
    fn status_severity_mapping() {
        assert_eq!(severity_for_status("alert"), 8);
        assert_eq!(severity_for_status("ongoing"), 6);
        assert_eq!(severity_for_status("past"), 3);
        assert_eq!(severity_for_status("draft"), 5);
    }
}
