//! Alert dashboard server.
//!
//! Receives alerts posted by scanning hosts, keeps the latest alert per
//! host and path in a JSON file, and serves the static dashboard frontend.

pub mod routes;
pub mod store;

pub use routes::{build_router, serve, serve_on, AppState};
pub use store::AlertStore;
