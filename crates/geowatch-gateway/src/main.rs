use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use geowatch_core::{Aggregator, GatewayConfig};
use geowatch_gateway::{create_router, AppState};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SAFE_ZONES_PATH: &str = "data/safe_zones.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let aggregator = Arc::new(Aggregator::new(GatewayConfig::default()));
    let safe_zones_path = std::env::var("SAFE_ZONES_PATH")
        .unwrap_or_else(|_| DEFAULT_SAFE_ZONES_PATH.to_owned());
    let safe_zones = geowatch_gateway::safe_zones::load(&safe_zones_path);
    let state = AppState::new(aggregator, safe_zones);

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(
        addr = %listener.local_addr()?,
        sources = 5,
        "geowatch gateway listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
