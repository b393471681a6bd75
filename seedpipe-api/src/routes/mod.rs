//! HTTP API handlers for seedpipe-api

pub mod health;
pub mod records;
pub mod seeds;

pub use health::health_routes;
pub use records::record_routes;
pub use seeds::seed_routes;
