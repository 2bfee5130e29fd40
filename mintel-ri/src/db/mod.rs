//! Database access for mintel-ri
//!
//! SQLite via sqlx. UUIDs and RFC 3339 timestamps are stored as TEXT, JSON columns
//! as TEXT. Tables are created at startup.

pub mod fingerprints;
pub mod insights;
pub mod profiles;
pub mod reports;
pub mod runs;
pub mod stage_rows;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Table definitions, applied in order
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS onboarding_profiles (
        user_id TEXT PRIMARY KEY,
        full_name TEXT NOT NULL,
        website_url TEXT NOT NULL,
        industry TEXT NOT NULL,
        location TEXT NOT NULL,
        target_keywords TEXT NOT NULL DEFAULT '[]',
        competitors TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS workflow_runs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        website_url TEXT NOT NULL,
        status TEXT NOT NULL,
        triggered_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        metadata TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_workflow_runs_user ON workflow_runs (user_id, triggered_at)",
    // At most one queued/running run per user
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_workflow_runs_one_active
        ON workflow_runs (user_id) WHERE status IN ('queued', 'running')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS signup_fingerprints (
        user_id TEXT PRIMARY KEY,
        ip_address TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_signup_fingerprints_ip ON signup_fingerprints (ip_address)",
    r#"
    CREATE TABLE IF NOT EXISTS competitor_domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        domain TEXT NOT NULL,
        origin TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS serp_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        search_engine TEXT NOT NULL,
        keyword TEXT NOT NULL,
        position INTEGER NOT NULL,
        url TEXT NOT NULL,
        domain TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS keyword_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        keyword TEXT NOT NULL,
        volume INTEGER NOT NULL,
        cpc REAL NOT NULL,
        difficulty REAL NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content_sentiments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        label TEXT NOT NULL,
        score REAL NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crawl_pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        url TEXT NOT NULL,
        title TEXT,
        description TEXT,
        word_count INTEGER NOT NULL,
        headings TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domain_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        domain TEXT NOT NULL,
        organic_traffic REAL NOT NULL,
        organic_keywords INTEGER NOT NULL,
        rank REAL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backlink_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        target TEXT NOT NULL,
        source TEXT NOT NULL,
        authority REAL NOT NULL,
        anchor_text TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS technical_audits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        source TEXT NOT NULL,
        metric TEXT NOT NULL,
        desktop REAL,
        mobile REAL,
        detail TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS business_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        domain TEXT NOT NULL,
        name TEXT,
        industry TEXT,
        employees INTEGER,
        location TEXT,
        tech_categories TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS news_mentions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        source TEXT NOT NULL,
        published_at TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id TEXT NOT NULL REFERENCES workflow_runs(id),
        email TEXT NOT NULL,
        name TEXT,
        position TEXT,
        confidence REAL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS share_of_voice_snapshots (
        workflow_id TEXT PRIMARY KEY REFERENCES workflow_runs(id),
        user_id TEXT NOT NULL,
        captured_at TEXT NOT NULL,
        share_of_voice REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_insights (
        workflow_id TEXT PRIMARY KEY REFERENCES workflow_runs(id),
        provider TEXT NOT NULL,
        summary TEXT NOT NULL,
        breaking_insights TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reports (
        workflow_id TEXT PRIMARY KEY REFERENCES workflow_runs(id),
        schema_version INTEGER NOT NULL,
        payload TEXT NOT NULL,
        captured_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_reports_captured_at ON reports (captured_at)",
];

/// Stage tables keyed by workflow_id, in pipeline order
pub const STAGE_TABLES: &[&str] = &[
    "competitor_domains",
    "serp_results",
    "keyword_metrics",
    "content_sentiments",
    "crawl_pages",
    "domain_metrics",
    "backlink_metrics",
    "technical_audits",
    "business_profiles",
    "news_mentions",
    "contacts",
];

/// Open (or create) the database file and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// The connection is never recycled, since dropping it would discard the database.
pub async fn init_in_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized ({} statements)", SCHEMA.len());

    Ok(())
}

/// True if the error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &mintel_common::Error) -> bool {
    match err {
        mintel_common::Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(column: &str, value: &str) -> mintel_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| mintel_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_opt_ts(
    column: &str,
    value: Option<String>,
) -> mintel_common::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(column, &v)).transpose()
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> mintel_common::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| mintel_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = init_in_memory_pool().await.unwrap();
        init_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for table in STAGE_TABLES {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }
        for table in ["workflow_runs", "onboarding_profiles", "reports", "ai_insights", "signup_fingerprints"] {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }
    }

    #[tokio::test]
    async fn test_file_database_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mintel.db");

        let pool = init_database_pool(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }
}
