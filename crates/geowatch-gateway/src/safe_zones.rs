use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One shelter/evacuation point from the bundled data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeZone {
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub capacity: u32,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafeZonesFile {
    safe_zones: Vec<SafeZone>,
}

/// Load the bundled safe-zones list. A missing or unreadable file is not
/// an error; the gateway simply serves an empty list.
pub fn load(path: impl AsRef<Path>) -> Vec<SafeZone> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path.display(), %error, "safe zones file unavailable, serving none");
            return Vec::new();
        }
    };

    match serde_json::from_str::<SafeZonesFile>(&raw) {
        Ok(file) => {
            info!(count = file.safe_zones.len(), "loaded safe zones");
            file.safe_zones
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "safe zones file malformed, serving none");
            Vec::new()
        }
    }
}
