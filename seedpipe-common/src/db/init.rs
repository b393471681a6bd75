//! Database initialization and records-table provisioning

use crate::config::DatabaseConfig;
use crate::schema::{raw_column, SchemaRules};
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::collections::HashSet;
use tracing::info;

/// Open (creating if needed) the database and bring its schema up to date.
pub async fn init_database(config: &DatabaseConfig, rules: &SchemaRules) -> Result<SqlitePool> {
    let pool = open_pool(config).await?;

    create_ingest_runs_table(&pool).await?;
    create_source_files_table(&pool).await?;
    provision_records_table(&pool, rules).await?;

    Ok(pool)
}

/// Open the connection pool with the pragmas every process needs.
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !config.path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", config.path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", config.path.display());
    } else {
        info!("Opened existing database: {}", config.path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL keeps readers on a consistent committed view while ingest writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    let pragma_sql = format!("PRAGMA busy_timeout = {}", config.busy_timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    Ok(pool)
}

async fn create_ingest_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id TEXT PRIMARY KEY,
            input_folder TEXT NOT NULL,
            state TEXT NOT NULL,
            files_seen INTEGER NOT NULL DEFAULT 0,
            files_skipped INTEGER NOT NULL DEFAULT 0,
            records_parsed INTEGER NOT NULL DEFAULT 0,
            records_accepted INTEGER NOT NULL DEFAULT 0,
            records_rejected INTEGER NOT NULL DEFAULT 0,
            duplicates_collapsed INTEGER NOT NULL DEFAULT 0,
            summary_json TEXT,
            started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            ended_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_source_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_files (
            checksum TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            run_id TEXT NOT NULL,
            record_count INTEGER NOT NULL DEFAULT 0,
            processed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the records table from the rule set and add any columns a newer
/// rule set introduces. Additive only: dropped or retyped rules need a
/// manual migration and surface as constraint errors until they get one.
pub async fn provision_records_table(pool: &SqlitePool, rules: &SchemaRules) -> Result<()> {
    let ddl = records_table_ddl(rules);
    sqlx::query(&ddl).execute(pool).await?;

    sync_records_columns(pool, rules).await?;

    for rule in rules.fields.iter().filter(|f| f.identity) {
        let idx = format!(
            "CREATE INDEX IF NOT EXISTS idx_records_{name} ON records(\"{name}\")",
            name = rule.name
        );
        sqlx::query(&idx).execute(pool).await?;
    }

    Ok(())
}

fn records_table_ddl(rules: &SchemaRules) -> String {
    let mut columns = vec!["identity_key TEXT PRIMARY KEY".to_string()];
    for rule in &rules.fields {
        columns.push(format!("\"{}\" {}", rule.name, rule.kind.sql_type()));
        if rule.normalize {
            columns.push(format!("\"{}\" TEXT", raw_column(&rule.name)));
        }
    }
    columns.push("source_path TEXT NOT NULL".to_string());
    columns.push("run_id TEXT NOT NULL".to_string());
    columns.push("first_seen_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string());
    columns.push("updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string());

    format!("CREATE TABLE IF NOT EXISTS records ({})", columns.join(", "))
}

/// Add columns the live table is missing, via PRAGMA table_info diffing.
async fn sync_records_columns(pool: &SqlitePool, rules: &SchemaRules) -> Result<()> {
    let rows = sqlx::query("PRAGMA table_info(records)")
        .fetch_all(pool)
        .await?;
    let existing: HashSet<String> = rows
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .collect();

    for rule in &rules.fields {
        if !existing.contains(&rule.name) {
            let sql = format!(
                "ALTER TABLE records ADD COLUMN \"{}\" {}",
                rule.name,
                rule.kind.sql_type()
            );
            info!("Adding column {} to records", rule.name);
            sqlx::query(&sql).execute(pool).await?;
        }
        if rule.normalize {
            let raw = raw_column(&rule.name);
            if !existing.contains(&raw) {
                let sql = format!("ALTER TABLE records ADD COLUMN \"{}\" TEXT", raw);
                info!("Adding column {} to records", raw);
                sqlx::query(&sql).execute(pool).await?;
            }
        }
    }

    Ok(())
}
