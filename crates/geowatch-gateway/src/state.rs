use std::sync::Arc;

use geowatch_core::Aggregator;

use crate::safe_zones::SafeZone;

/// Shared handler state: the aggregator built at process start plus the
/// static safe-zones list.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub safe_zones: Arc<Vec<SafeZone>>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, safe_zones: Vec<SafeZone>) -> Self {
        Self {
            aggregator,
            safe_zones: Arc::new(safe_zones),
        }
    }
}
