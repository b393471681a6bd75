//! Record lookup endpoints
//!
//! Rows are rendered per the active schema rule set, so a deployment with
//! custom rules serves its own field names here without code changes.

use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use seedpipe_common::db::records::{fetch_by_identity, list_records};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    field: Option<String>,
    value: Option<String>,
    limit: Option<i64>,
}

/// GET /records/:identity_key
pub async fn get_record(
    State(state): State<AppState>,
    Path(identity_key): Path<String>,
) -> ApiResult<Json<Value>> {
    match fetch_by_identity(&state.db, &state.rules, &identity_key).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!(
            "no record with identity key {}",
            identity_key
        ))),
    }
}

/// GET /records?field=<name>&value=<v>&limit=<n>
///
/// `field` and `value` come together or not at all; `field` must be a
/// declared schema field. The limit is clamped to the configured maximum.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let filter = match (&query.field, &query.value) {
        (Some(field), Some(value)) => Some((field.as_str(), value.as_str())),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "field and value must be given together".to_string(),
            ))
        }
    };

    let limit = query
        .limit
        .unwrap_or(state.config.api.default_list_limit)
        .clamp(1, state.config.api.max_list_limit);

    let records = list_records(&state.db, &state.rules, filter, limit).await?;

    Ok(Json(json!({
        "count": records.len(),
        "records": records,
    })))
}

/// Build record lookup routes
pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list))
        .route("/records/:identity_key", get(get_record))
}
