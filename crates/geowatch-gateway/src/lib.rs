//! HTTP surface for the geowatch disaster aggregation gateway.
//!
//! The core does the heavy lifting (fan-out, caching, breakers); this
//! crate wires it to an axum router, the bundled safe-zones list, and
//! the static browser client.

pub mod error;
pub mod routes;
pub mod safe_zones;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
