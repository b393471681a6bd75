//! Seed-domain endpoints
//!
//! Mounted only when the active rule set has string `seed` and `variation`
//! fields. Lookups fold candidate text the same way ingestion did, so
//! "Michaël" finds the stored "michael" row.

use axum::extract::State;
use axum::{routing::post, Json, Router};
use seedpipe_common::normalize::normalize_text;
use seedpipe_common::schema::FieldRule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::Row;
use std::collections::{HashMap, HashSet};

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ExistsRequest {
    pub seeds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SeedStatus {
    pub seed: String,
    pub exists: bool,
    pub variation_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct DiffRequest {
    pub seed: String,
    pub variations: Vec<String>,
}

fn needle(state: &AppState, rule: Option<&FieldRule>, value: &str) -> String {
    match rule {
        Some(rule) if rule.normalize => normalize_text(value, state.rules.collapse_repeats),
        _ => value.to_string(),
    }
}

/// POST /seeds/exists
///
/// Response order matches request order.
pub async fn seeds_exist(
    State(state): State<AppState>,
    Json(request): Json<ExistsRequest>,
) -> ApiResult<Json<Vec<SeedStatus>>> {
    let seed_rule = state.rules.field("seed");
    let needles: Vec<String> = request
        .seeds
        .iter()
        .map(|seed| needle(&state, seed_rule, seed))
        .collect();

    let mut counts: HashMap<String, i64> = HashMap::new();
    if !needles.is_empty() {
        let placeholders = vec!["?"; needles.len()].join(", ");
        let sql = format!(
            "SELECT seed, COUNT(*) AS variation_count FROM records \
             WHERE seed IN ({}) GROUP BY seed",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for seed in &needles {
            query = query.bind(seed);
        }
        for row in query.fetch_all(&state.db).await? {
            counts.insert(row.try_get("seed")?, row.try_get("variation_count")?);
        }
    }

    let statuses = request
        .seeds
        .into_iter()
        .zip(needles.iter())
        .map(|(seed, needle)| {
            let count = counts.get(needle).copied().unwrap_or(0);
            SeedStatus {
                seed,
                exists: count > 0,
                variation_count: count,
            }
        })
        .collect();

    Ok(Json(statuses))
}

/// POST /seeds/diff
///
/// Splits candidate variations of one seed into those already stored and
/// those not seen yet, preserving request order within each list.
pub async fn seeds_diff(
    State(state): State<AppState>,
    Json(request): Json<DiffRequest>,
) -> ApiResult<Json<Value>> {
    let seed_needle = needle(&state, state.rules.field("seed"), &request.seed);
    let variation_rule = state.rules.field("variation");
    let needles: Vec<String> = request
        .variations
        .iter()
        .map(|variation| needle(&state, variation_rule, variation))
        .collect();

    let mut stored: HashSet<String> = HashSet::new();
    if !needles.is_empty() {
        let placeholders = vec!["?"; needles.len()].join(", ");
        let sql = format!(
            "SELECT variation FROM records WHERE seed = ? AND variation IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(&seed_needle);
        for variation in &needles {
            query = query.bind(variation);
        }
        for row in query.fetch_all(&state.db).await? {
            stored.insert(row.try_get("variation")?);
        }
    }

    let mut existing = Vec::new();
    let mut fresh = Vec::new();
    for (variation, needle) in request.variations.into_iter().zip(needles.iter()) {
        if stored.contains(needle) {
            existing.push(variation);
        } else {
            fresh.push(variation);
        }
    }

    Ok(Json(json!({
        "existing": existing,
        "new": fresh,
    })))
}

/// Build seed-domain routes
pub fn seed_routes() -> Router<AppState> {
    Router::new()
        .route("/seeds/exists", post(seeds_exist))
        .route("/seeds/diff", post(seeds_diff))
}
