//! Append-only stage tables
//!
//! Every adapter's normalized rows are written keyed by workflow id, one transaction
//! per batch. Rows are never updated.

use chrono::Utc;
use mintel_common::Result;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{format_ts, parse_ts, STAGE_TABLES};
use crate::models::{
    BacklinkMetric, BusinessProfile, CompetitorDomain, Contact, ContentSentiment, CrawlPage,
    DomainMetric, KeywordMetric, NewsMention, SerpResult, ShareOfVoiceSnapshot, TechnicalAudit,
};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Insert `rows` in one transaction.
///
/// `sql` must start with `(workflow_id, created_at, ...)` placeholders; `bind_row`
/// binds the remaining columns for one row.
async fn insert_rows<T, F>(
    pool: &SqlitePool,
    operation: &str,
    sql: &str,
    workflow_id: Uuid,
    rows: &[T],
    bind_row: F,
) -> Result<()>
where
    T: Sync,
    F: for<'q> Fn(SqliteQuery<'q>, &T) -> SqliteQuery<'q> + Sync,
{
    if rows.is_empty() {
        return Ok(());
    }

    let workflow_id = workflow_id.to_string();
    let created_at = format_ts(&Utc::now());

    retry_on_lock(operation, DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;
        for row in rows {
            let query = sqlx::query(sql)
                .bind(workflow_id.as_str())
                .bind(created_at.as_str());
            bind_row(query, row).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    })
    .await?;

    tracing::debug!(operation, workflow_id = %workflow_id, rows = rows.len(), "Stage rows persisted");
    Ok(())
}

pub async fn insert_competitors(pool: &SqlitePool, workflow_id: Uuid, rows: &[CompetitorDomain]) -> Result<()> {
    insert_rows(
        pool,
        "insert_competitors",
        "INSERT INTO competitor_domains (workflow_id, created_at, domain, origin) VALUES (?, ?, ?, ?)",
        workflow_id,
        rows,
        |q, r| q.bind(r.domain.clone()).bind(r.origin.as_str()),
    )
    .await
}

pub async fn insert_serp_results(pool: &SqlitePool, workflow_id: Uuid, rows: &[SerpResult]) -> Result<()> {
    insert_rows(
        pool,
        "insert_serp_results",
        r#"INSERT INTO serp_results (workflow_id, created_at, search_engine, keyword, position, url, domain)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.search_engine.clone())
                .bind(r.keyword.clone())
                .bind(r.position as i64)
                .bind(r.url.clone())
                .bind(r.domain.clone())
        },
    )
    .await
}

pub async fn insert_keyword_metrics(pool: &SqlitePool, workflow_id: Uuid, rows: &[KeywordMetric]) -> Result<()> {
    insert_rows(
        pool,
        "insert_keyword_metrics",
        "INSERT INTO keyword_metrics (workflow_id, created_at, keyword, volume, cpc, difficulty) VALUES (?, ?, ?, ?, ?, ?)",
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.keyword.clone())
                .bind(r.volume as i64)
                .bind(r.cpc)
                .bind(r.difficulty)
        },
    )
    .await
}

pub async fn insert_sentiments(pool: &SqlitePool, workflow_id: Uuid, rows: &[ContentSentiment]) -> Result<()> {
    insert_rows(
        pool,
        "insert_sentiments",
        "INSERT INTO content_sentiments (workflow_id, created_at, label, score) VALUES (?, ?, ?, ?)",
        workflow_id,
        rows,
        |q, r| q.bind(r.label.clone()).bind(r.score),
    )
    .await
}

pub async fn insert_crawl_pages(pool: &SqlitePool, workflow_id: Uuid, rows: &[CrawlPage]) -> Result<()> {
    insert_rows(
        pool,
        "insert_crawl_pages",
        r#"INSERT INTO crawl_pages (workflow_id, created_at, url, title, description, word_count, headings)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.url.clone())
                .bind(r.title.clone())
                .bind(r.description.clone())
                .bind(r.word_count as i64)
                .bind(serde_json::to_string(&r.headings).unwrap_or_else(|_| "[]".to_string()))
        },
    )
    .await
}

pub async fn insert_domain_metrics(pool: &SqlitePool, workflow_id: Uuid, rows: &[DomainMetric]) -> Result<()> {
    insert_rows(
        pool,
        "insert_domain_metrics",
        r#"INSERT INTO domain_metrics (workflow_id, created_at, domain, organic_traffic, organic_keywords, rank)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.domain.clone())
                .bind(r.organic_traffic)
                .bind(r.organic_keywords as i64)
                .bind(r.rank)
        },
    )
    .await
}

pub async fn insert_backlinks(pool: &SqlitePool, workflow_id: Uuid, rows: &[BacklinkMetric]) -> Result<()> {
    insert_rows(
        pool,
        "insert_backlinks",
        r#"INSERT INTO backlink_metrics (workflow_id, created_at, target, source, authority, anchor_text)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.target.clone())
                .bind(r.source.clone())
                .bind(r.authority)
                .bind(r.anchor_text.clone())
        },
    )
    .await
}

pub async fn insert_technical_audits(pool: &SqlitePool, workflow_id: Uuid, rows: &[TechnicalAudit]) -> Result<()> {
    insert_rows(
        pool,
        "insert_technical_audits",
        r#"INSERT INTO technical_audits (workflow_id, created_at, source, metric, desktop, mobile, detail)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.source.as_str())
                .bind(r.metric.clone())
                .bind(r.desktop)
                .bind(r.mobile)
                .bind(r.detail.clone())
        },
    )
    .await
}

pub async fn insert_business_profiles(pool: &SqlitePool, workflow_id: Uuid, rows: &[BusinessProfile]) -> Result<()> {
    insert_rows(
        pool,
        "insert_business_profiles",
        r#"INSERT INTO business_profiles (workflow_id, created_at, domain, name, industry, employees, location, tech_categories)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.domain.clone())
                .bind(r.name.clone())
                .bind(r.industry.clone())
                .bind(r.employees.map(|e| e as i64))
                .bind(r.location.clone())
                .bind(serde_json::to_string(&r.tech_categories).unwrap_or_else(|_| "[]".to_string()))
        },
    )
    .await
}

pub async fn insert_news_mentions(pool: &SqlitePool, workflow_id: Uuid, rows: &[NewsMention]) -> Result<()> {
    insert_rows(
        pool,
        "insert_news_mentions",
        r#"INSERT INTO news_mentions (workflow_id, created_at, title, url, source, published_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.title.clone())
                .bind(r.url.clone())
                .bind(r.source.clone())
                .bind(r.published_at.clone())
        },
    )
    .await
}

pub async fn insert_contacts(pool: &SqlitePool, workflow_id: Uuid, rows: &[Contact]) -> Result<()> {
    insert_rows(
        pool,
        "insert_contacts",
        r#"INSERT INTO contacts (workflow_id, created_at, email, name, position, confidence)
           VALUES (?, ?, ?, ?, ?, ?)"#,
        workflow_id,
        rows,
        |q, r| {
            q.bind(r.email.clone())
                .bind(r.name.clone())
                .bind(r.position.clone())
                .bind(r.confidence)
        },
    )
    .await
}

/// Store this run's share of voice
pub async fn insert_share_of_voice(
    pool: &SqlitePool,
    workflow_id: Uuid,
    user_id: &str,
    snapshot: &ShareOfVoiceSnapshot,
) -> Result<()> {
    let workflow_id = workflow_id.to_string();
    let captured_at = format_ts(&snapshot.captured_at);

    retry_on_lock("insert_share_of_voice", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO share_of_voice_snapshots (workflow_id, user_id, captured_at, share_of_voice)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(workflow_id) DO UPDATE SET
                captured_at = excluded.captured_at,
                share_of_voice = excluded.share_of_voice
            "#,
        )
        .bind(&workflow_id)
        .bind(user_id)
        .bind(&captured_at)
        .bind(snapshot.share_of_voice)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Share-of-voice history for a user, oldest first
///
/// Includes snapshots of completed runs plus the run identified by `current_run`
/// (which is still RUNNING while its report is assembled).
pub async fn share_of_voice_timeline(
    pool: &SqlitePool,
    user_id: &str,
    current_run: Uuid,
) -> Result<Vec<ShareOfVoiceSnapshot>> {
    let rows = sqlx::query(
        r#"
        SELECT s.captured_at, s.share_of_voice
        FROM share_of_voice_snapshots s
        WHERE s.user_id = ?
          AND (s.workflow_id = ?
               OR s.workflow_id IN (SELECT id FROM workflow_runs WHERE status = 'completed'))
        ORDER BY s.captured_at ASC
        "#,
    )
    .bind(user_id)
    .bind(current_run.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let captured_at: String = row.get("captured_at");
            Ok(ShareOfVoiceSnapshot {
                captured_at: parse_ts("captured_at", &captured_at)?,
                share_of_voice: row.get("share_of_voice"),
            })
        })
        .collect()
}

/// Row count per stage table for one run
pub async fn count_stage_rows(pool: &SqlitePool, workflow_id: Uuid) -> Result<BTreeMap<String, i64>> {
    let workflow_id = workflow_id.to_string();
    let mut counts = BTreeMap::new();

    for table in STAGE_TABLES {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE workflow_id = ?",
            table
        ))
        .bind(&workflow_id)
        .fetch_one(pool)
        .await?;
        counts.insert(table.to_string(), count);
    }

    Ok(counts)
}
