//! seedpipe-api library interface for testing
//!
//! Read-only query surface over the records store. The ingest CLI writes;
//! this process only ever reads committed rows.

pub mod error;
pub mod routes;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use seedpipe_common::config::SeedpipeConfig;
use seedpipe_common::schema::SchemaRules;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Active schema rule set; drives rendering and filter validation
    pub rules: Arc<SchemaRules>,
    /// Loaded configuration (list limits)
    pub config: Arc<SeedpipeConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, rules: SchemaRules, config: SeedpipeConfig) -> Self {
        Self {
            db,
            rules: Arc::new(rules),
            config: Arc::new(config),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Seed endpoints are mounted only when the active rule set carries the
/// seed domain; under a custom schema they 404.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(routes::health_routes())
        .merge(routes::record_routes());

    if state.rules.has_seed_domain() {
        router = router.merge(routes::seed_routes());
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
