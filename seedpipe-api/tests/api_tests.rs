//! Integration tests for the seedpipe query API
//!
//! Routers are exercised in-process with oneshot requests against
//! temp-directory databases seeded through the shared store layer.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::Router;
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use seedpipe_api::{build_router, AppState};
use seedpipe_common::config::{DatabaseConfig, SeedpipeConfig};
use seedpipe_common::db::init_database;
use seedpipe_common::db::records::{upsert_record, upsert_sql};
use seedpipe_common::normalize::normalize_text;
use seedpipe_common::schema::{FieldKind, FieldRule, FieldValue, Record, SchemaRules};

async fn setup_pool(rules: &SchemaRules) -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("seedpipe.db"),
        ..Default::default()
    };
    let pool = init_database(&config, rules).await.unwrap();
    (dir, pool)
}

fn seed_state(pool: SqlitePool) -> AppState {
    AppState::new(pool, SchemaRules::seed_default(), SeedpipeConfig::default())
}

/// Insert one seed-domain record the way ingestion stores it, returning
/// its identity key.
async fn insert_record(
    pool: &SqlitePool,
    seed: &str,
    variation: &str,
    score: Option<f64>,
) -> String {
    let rules = SchemaRules::seed_default();
    let mut values = BTreeMap::new();
    let mut raw_texts = BTreeMap::new();

    values.insert(
        "seed".to_string(),
        FieldValue::Text(normalize_text(seed, false)),
    );
    raw_texts.insert("seed".to_string(), seed.trim().to_string());
    values.insert(
        "variation".to_string(),
        FieldValue::Text(normalize_text(variation, false)),
    );
    raw_texts.insert("variation".to_string(), variation.trim().to_string());
    values.insert("miner".to_string(), FieldValue::Null);
    values.insert(
        "score".to_string(),
        score.map(FieldValue::Real).unwrap_or(FieldValue::Null),
    );

    let record = Record {
        identity_key: rules.identity_key(&values),
        values,
        raw_texts,
        source_path: "seeded.json".to_string(),
    };

    let sql = upsert_sql(&rules);
    let mut tx = pool.begin().await.unwrap();
    upsert_record(&mut tx, &rules, &sql, &record, "run-test")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    record.identity_key
}

/// Helper to make HTTP requests against the router
async fn make_request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = match body {
        Some(json_body) => request
            .body(axum::body::Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(axum::body::Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json_body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };

    (status, json_body)
}

#[tokio::test]
async fn health_reports_module_and_version() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    let body = body.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "seedpipe-api");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn fetches_one_record_by_identity_key() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    let key = insert_record(&pool, "  Michaël ", "MIKE", Some(0.5)).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(&app, Method::GET, &format!("/records/{}", key), None).await;
    let body = body.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity_key"], key.as_str());
    assert_eq!(body["seed"], "michael");
    assert_eq!(body["seed_raw"], "Michaël");
    assert_eq!(body["variation"], "mike");
    assert_eq!(body["score"], 0.5);
}

#[tokio::test]
async fn unknown_identity_key_is_404() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(&app, Method::GET, "/records/no-such-key", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_filter_folds_the_needle_like_ingestion() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    insert_record(&pool, "Michaël", "mike", None).await;
    insert_record(&pool, "michael", "misha", None).await;
    insert_record(&pool, "other", "variant", None).await;
    let app = build_router(seed_state(pool));

    // value=MICHA%C3%8BL percent-decodes to MICHAËL
    let (status, body) = make_request(
        &app,
        Method::GET,
        "/records?field=seed&value=MICHA%C3%8BL",
        None,
    )
    .await;
    let body = body.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    for record in body["records"].as_array().unwrap() {
        assert_eq!(record["seed"], "michael");
    }
}

#[tokio::test]
async fn list_rejects_field_without_value() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(&app, Method::GET, "/records?field=seed", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn list_rejects_undeclared_filter_fields() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    let app = build_router(seed_state(pool));

    let (status, body) =
        make_request(&app, Method::GET, "/records?field=nope&value=x", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body.unwrap()["error"]["message"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(message.contains("unknown filter field"));
}

#[tokio::test]
async fn list_limit_is_clamped_to_the_configured_maximum() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    for variation in ["a", "b", "c"] {
        insert_record(&pool, "seed", variation, None).await;
    }

    let mut config = SeedpipeConfig::default();
    config.api.default_list_limit = 1;
    config.api.max_list_limit = 2;
    let app = build_router(AppState::new(pool, SchemaRules::seed_default(), config));

    let (_, body) = make_request(&app, Method::GET, "/records?limit=100", None).await;
    assert_eq!(body.unwrap()["count"], 2);

    let (_, body) = make_request(&app, Method::GET, "/records", None).await;
    assert_eq!(body.unwrap()["count"], 1);
}

#[tokio::test]
async fn seeds_exists_counts_variations_per_requested_seed() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    insert_record(&pool, "michael", "mike", None).await;
    insert_record(&pool, "michael", "misha", None).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/seeds/exists",
        Some(json!({"seeds": ["  Michaël ", "unknown"]})),
    )
    .await;
    let body = body.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["seed"], "  Michaël ");
    assert_eq!(body[0]["exists"], true);
    assert_eq!(body[0]["variation_count"], 2);
    assert_eq!(body[1]["seed"], "unknown");
    assert_eq!(body[1]["exists"], false);
    assert_eq!(body[1]["variation_count"], 0);
}

#[tokio::test]
async fn seeds_diff_splits_candidates_by_stored_variations() {
    let rules = SchemaRules::seed_default();
    let (_dir, pool) = setup_pool(&rules).await;
    insert_record(&pool, "michael", "mike", None).await;
    insert_record(&pool, "michael", "mickey", None).await;
    let app = build_router(seed_state(pool));

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/seeds/diff",
        Some(json!({"seed": "MICHAEL", "variations": ["MIKE", "misha"]})),
    )
    .await;
    let body = body.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["existing"], json!(["MIKE"]));
    assert_eq!(body["new"], json!(["misha"]));
}

#[tokio::test]
async fn seed_routes_are_absent_without_the_seed_domain() {
    let rules = SchemaRules {
        fields: vec![FieldRule::new("id", FieldKind::String).required().identity()],
        collapse_repeats: false,
    };
    let (_dir, pool) = setup_pool(&rules).await;
    let app = build_router(AppState::new(pool, rules, SeedpipeConfig::default()));

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/seeds/exists",
        Some(json!({"seeds": ["x"]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
