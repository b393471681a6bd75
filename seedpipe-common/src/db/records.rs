//! Records table access
//!
//! All SQL here is built from the rule set at runtime: one column per
//! field plus a `<name>_raw` column per normalized field, keyed by
//! identity_key. Rule names are validated at configuration load, which is
//! what makes embedding them in statements safe.

use crate::normalize::normalize_text;
use crate::schema::{raw_column, FieldKind, FieldValue, Record, SchemaRules};
use crate::{Error, Result};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

/// Build the upsert statement for the active rule set, once per run.
pub fn upsert_sql(rules: &SchemaRules) -> String {
    let mut columns = vec!["identity_key".to_string()];
    for rule in &rules.fields {
        columns.push(format!("\"{}\"", rule.name));
        if rule.normalize {
            columns.push(format!("\"{}\"", raw_column(&rule.name)));
        }
    }
    columns.push("source_path".to_string());
    columns.push("run_id".to_string());

    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();

    format!(
        "INSERT INTO records ({}) VALUES ({}) \
         ON CONFLICT(identity_key) DO UPDATE SET {}, updated_at = CURRENT_TIMESTAMP",
        columns.join(", "),
        placeholders,
        updates.join(", ")
    )
}

/// Upsert one record inside the caller's transaction.
///
/// Returns the raw sqlx error so the caller can classify and retry.
pub async fn upsert_record(
    tx: &mut Transaction<'_, Sqlite>,
    rules: &SchemaRules,
    sql: &str,
    record: &Record,
    run_id: &str,
) -> std::result::Result<(), sqlx::Error> {
    let mut query = sqlx::query(sql).bind(&record.identity_key);

    for rule in &rules.fields {
        query = match record.values.get(&rule.name) {
            Some(FieldValue::Text(s)) => query.bind(s),
            Some(FieldValue::Integer(i)) => query.bind(*i),
            Some(FieldValue::Real(f)) => query.bind(*f),
            Some(FieldValue::Boolean(b)) => query.bind(*b),
            Some(FieldValue::Null) | None => query.bind(Option::<String>::None),
        };
        if rule.normalize {
            query = query.bind(record.raw_texts.get(&rule.name));
        }
    }

    query = query.bind(&record.source_path).bind(run_id);
    query.execute(&mut **tx).await?;

    Ok(())
}

/// Fetch one committed record as JSON by identity key.
pub async fn fetch_by_identity(
    pool: &SqlitePool,
    rules: &SchemaRules,
    identity_key: &str,
) -> Result<Option<Value>> {
    let row = sqlx::query("SELECT * FROM records WHERE identity_key = ?")
        .bind(identity_key)
        .fetch_optional(pool)
        .await?;

    row.map(|r| render_row(rules, &r)).transpose()
}

/// List committed records, optionally filtered on one declared field.
///
/// String filters on normalized fields are normalized before comparison so
/// lookups behave like ingestion did.
pub async fn list_records(
    pool: &SqlitePool,
    rules: &SchemaRules,
    filter: Option<(&str, &str)>,
    limit: i64,
) -> Result<Vec<Value>> {
    let rows = match filter {
        None => {
            sqlx::query("SELECT * FROM records ORDER BY identity_key LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        Some((field, value)) => {
            let rule = rules
                .field(field)
                .ok_or_else(|| Error::InvalidInput(format!("unknown filter field: {}", field)))?;
            let sql = format!(
                "SELECT * FROM records WHERE \"{}\" = ? ORDER BY identity_key LIMIT ?",
                rule.name
            );
            match rule.kind {
                FieldKind::String => {
                    let needle = if rule.normalize {
                        normalize_text(value, rules.collapse_repeats)
                    } else {
                        value.to_string()
                    };
                    sqlx::query(&sql)
                        .bind(needle)
                        .bind(limit)
                        .fetch_all(pool)
                        .await?
                }
                FieldKind::Integer => {
                    let needle: i64 = value.parse().map_err(|_| {
                        Error::InvalidInput(format!("expected an integer for field {}", field))
                    })?;
                    sqlx::query(&sql)
                        .bind(needle)
                        .bind(limit)
                        .fetch_all(pool)
                        .await?
                }
                FieldKind::Float => {
                    let needle: f64 = value.parse().map_err(|_| {
                        Error::InvalidInput(format!("expected a number for field {}", field))
                    })?;
                    sqlx::query(&sql)
                        .bind(needle)
                        .bind(limit)
                        .fetch_all(pool)
                        .await?
                }
                FieldKind::Boolean => {
                    let needle = match value {
                        "true" | "1" => true,
                        "false" | "0" => false,
                        _ => {
                            return Err(Error::InvalidInput(format!(
                                "expected a boolean for field {}",
                                field
                            )))
                        }
                    };
                    sqlx::query(&sql)
                        .bind(needle)
                        .bind(limit)
                        .fetch_all(pool)
                        .await?
                }
            }
        }
    };

    rows.iter().map(|row| render_row(rules, row)).collect()
}

/// Total committed records.
pub async fn count_records(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Render a records row as a JSON object per the rule set.
pub fn render_row(rules: &SchemaRules, row: &SqliteRow) -> Result<Value> {
    let mut map = serde_json::Map::new();
    map.insert(
        "identity_key".to_string(),
        json!(row.try_get::<String, _>("identity_key")?),
    );

    for rule in &rules.fields {
        let value = match rule.kind {
            FieldKind::String => row
                .try_get::<Option<String>, _>(rule.name.as_str())?
                .map(Value::String)
                .unwrap_or(Value::Null),
            FieldKind::Integer => row
                .try_get::<Option<i64>, _>(rule.name.as_str())?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            FieldKind::Float => row
                .try_get::<Option<f64>, _>(rule.name.as_str())?
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            FieldKind::Boolean => row
                .try_get::<Option<bool>, _>(rule.name.as_str())?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
        };
        map.insert(rule.name.clone(), value);

        if rule.normalize {
            let raw = raw_column(&rule.name);
            let value = row
                .try_get::<Option<String>, _>(raw.as_str())?
                .map(Value::String)
                .unwrap_or(Value::Null);
            map.insert(raw, value);
        }
    }

    map.insert(
        "source_path".to_string(),
        json!(row.try_get::<String, _>("source_path")?),
    );
    map.insert(
        "run_id".to_string(),
        json!(row.try_get::<String, _>("run_id")?),
    );
    map.insert(
        "first_seen_at".to_string(),
        json!(row.try_get::<String, _>("first_seen_at")?),
    );
    map.insert(
        "updated_at".to_string(),
        json!(row.try_get::<String, _>("updated_at")?),
    );

    Ok(Value::Object(map))
}
