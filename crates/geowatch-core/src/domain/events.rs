use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::UtcDateTime;

/// Normalized disaster category shared by all five upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Earthquake,
    Wildfire,
    Fire,
    Flood,
    Hurricane,
    Tornado,
    Volcano,
    Epidemic,
    War,
    Thunderstorm,
    Tsunami,
    Drought,
    Snow,
    Heat,
    Wind,
    Landslide,
    DustHaze,
    SeaLakeIce,
    Temperature,
    Other,
}

impl EventKind {
    /// Estimated impact radius in meters when the upstream gives none.
    pub const fn default_radius_m(self) -> u32 {
        match self {
            Self::Earthquake => 50_000,
            Self::Hurricane => 200_000,
            Self::Tornado => 15_000,
            Self::Flood => 30_000,
            Self::Wildfire => 25_000,
            Self::Volcano => 40_000,
            Self::Epidemic => 100_000,
            Self::War => 150_000,
            Self::Tsunami => 100_000,
            Self::Thunderstorm => 20_000,
            Self::Drought => 200_000,
            _ => 20_000,
        }
    }

    pub const fn is_weather(self) -> bool {
        matches!(
            self,
            Self::Hurricane | Self::Tornado | Self::Thunderstorm | Self::Flood | Self::Snow | Self::Heat
        )
    }
}

/// Identifies one of the five upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamId {
    Usgs,
    NasaEonet,
    Gdacs,
    ReliefWeb,
    Nws,
}

impl UpstreamId {
    pub const ALL: [Self; 5] = [
        Self::Usgs,
        Self::NasaEonet,
        Self::Gdacs,
        Self::ReliefWeb,
        Self::Nws,
    ];

    /// Short slug used in route parameters and logs.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Usgs => "usgs",
            Self::NasaEonet => "nasa",
            Self::Gdacs => "gdacs",
            Self::ReliefWeb => "reliefweb",
            Self::Nws => "nws",
        }
    }

    /// Human-facing provider label used in event payloads.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Usgs => "USGS",
            Self::NasaEonet => "NASA EONET",
            Self::Gdacs => "GDACS",
            Self::ReliefWeb => "ReliefWeb",
            Self::Nws => "NWS",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Usgs => 0,
            Self::NasaEonet => 1,
            Self::Gdacs => 2,
            Self::ReliefWeb => 3,
            Self::Nws => 4,
        }
    }
}

impl Display for UpstreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl std::error::Error for UpstreamId {}

impl FromStr for UpstreamId {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "usgs" => Ok(Self::Usgs),
            "nasa" => Ok(Self::NasaEonet),
            "gdacs" => Ok(Self::Gdacs),
            "reliefweb" => Ok(Self::ReliefWeb),
            "nws" => Ok(Self::Nws),
            _ => Err(()),
        }
    }
}

impl Serialize for UpstreamId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

/// Provider-specific extras carried through unmodified; informational only.
/// Absent fields serialize to nothing, so an empty set adds no keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// The unit the gateway traffics in: one upstream report, normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterEvent {
    /// Assigned by the aggregator per merged batch; not stable across fetches.
    pub sequence_id: u64,
    pub source_id: String,
    pub source: UpstreamId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub severity: u8,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "radius")]
    pub radius_m: u32,
    pub location: String,
    pub description: String,
    pub timestamp: UtcDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extras: EventExtras,
}

impl DisasterEvent {
    /// Coordinate sanity gate applied by every decoder. Events failing it
    /// are dropped, never clamped.
    pub fn coordinates_valid(lat: f64, lng: f64) -> bool {
        lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
    }

    pub fn clamp_severity(raw: i64) -> u8 {
        raw.clamp(1, 10) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::DustHaze).expect("serialize"),
            "\"dustHaze\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::SeaLakeIce).expect("serialize"),
            "\"seaLakeIce\""
        );
    }

    #[test]
    fn upstream_labels_and_slugs_round_trip() {
        for id in UpstreamId::ALL {
            assert_eq!(id.slug().parse::<UpstreamId>(), Ok(id));
        }
        assert_eq!(UpstreamId::NasaEonet.label(), "NASA EONET");
        assert!("eonet".parse::<UpstreamId>().is_err());
    }

    #[test]
    fn coordinate_gate_rejects_out_of_range_and_non_finite() {
        assert!(DisasterEvent::coordinates_valid(41.0, 142.2));
        assert!(!DisasterEvent::coordinates_valid(91.0, 0.0));
        assert!(!DisasterEvent::coordinates_valid(0.0, -181.0));
        assert!(!DisasterEvent::coordinates_valid(f64::NAN, 0.0));
    }

    #[test]
    fn event_wire_shape_uses_type_and_radius_names() {
        let event = DisasterEvent {
            sequence_id: 1,
            source_id: "us7000n".into(),
            source: UpstreamId::Usgs,
            kind: EventKind::Earthquake,
            severity: 9,
            lat: 41.0027,
            lng: 142.1714,
            radius_m: 242_515,
            location: "Aomori Prefecture, Japan".into(),
            description: "M 7.6".into(),
            timestamp: UtcDateTime::from_unix_millis(1_733_666_110_460).expect("valid"),
            url: None,
            extras: EventExtras {
                magnitude: Some(7.6),
                ..EventExtras::default()
            },
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "earthquake");
        assert_eq!(json["radius"], 242_515);
        assert_eq!(json["source"], "USGS");
        assert_eq!(json["sequenceId"], 1);
        assert_eq!(json["magnitude"], 7.6);
    }
}
