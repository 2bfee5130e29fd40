//! Report persistence
//!
//! Payloads are stored verbatim as JSON text together with the schema version they
//! were written with. Rows are never rewritten; upgrades happen on read. A report is
//! only served once its run is `completed`, and that status is written in the same
//! transaction as the report itself.

use chrono::Utc;
use mintel_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_ts, insights, parse_ts, parse_uuid};
use crate::models::{AiInsight, Report, RunStatus, WorkflowRun};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const INSERT_REPORT: &str =
    "INSERT INTO reports (workflow_id, schema_version, payload, captured_at) VALUES (?, ?, ?, ?)";

pub async fn insert_report(pool: &SqlitePool, report: &Report) -> Result<()> {
    let workflow_id = report.workflow_id.to_string();
    let payload = serde_json::to_string(&report.payload)?;
    let captured_at = format_ts(&report.captured_at);
    let schema_version = report.schema_version as i64;

    retry_on_lock("insert_report", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(INSERT_REPORT)
            .bind(&workflow_id)
            .bind(schema_version)
            .bind(&payload)
            .bind(&captured_at)
            .execute(pool)
            .await?;

        Ok(())
    })
    .await
}

/// Store the insight and report of a run and mark it completed, atomically
///
/// `run` must already carry its `Completed` state. The row is only updated while it
/// is still `running`; otherwise nothing is written.
pub async fn commit_completed_run(
    pool: &SqlitePool,
    run: &WorkflowRun,
    insight: &AiInsight,
    report: &Report,
) -> Result<()> {
    if run.status != RunStatus::Completed || report.workflow_id != run.id {
        return Err(mintel_common::Error::InvalidInput(format!(
            "Run {} is not ready to commit its report",
            run.id
        )));
    }

    let workflow_id = run.id.to_string();
    let payload = serde_json::to_string(&report.payload)?;
    let captured_at = format_ts(&report.captured_at);
    let schema_version = report.schema_version as i64;
    let created_at = format_ts(&Utc::now());
    let started_at = run.started_at.as_ref().map(format_ts);
    let completed_at = run.completed_at.as_ref().map(format_ts);
    let metadata = serde_json::to_string(&run.metadata)?;

    let rows_affected = retry_on_lock("commit_completed_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;

        insights::insert_insight(&mut *tx, &workflow_id, insight, &created_at).await?;

        sqlx::query(INSERT_REPORT)
            .bind(&workflow_id)
            .bind(schema_version)
            .bind(&payload)
            .bind(&captured_at)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = ?, started_at = ?, completed_at = ?, metadata = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(RunStatus::Completed.as_str())
        .bind(&started_at)
        .bind(&completed_at)
        .bind(&metadata)
        .bind(&workflow_id)
        .bind(RunStatus::Running.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the insight and report rows
            return Ok(0);
        }

        tx.commit().await?;
        Ok(result.rows_affected())
    })
    .await?;

    if rows_affected == 0 {
        return Err(mintel_common::Error::InvalidInput(format!(
            "Workflow run {} is no longer running",
            run.id
        )));
    }

    Ok(())
}

/// Newest report across the user's runs
pub async fn latest_report_for_user(pool: &SqlitePool, user_id: &str) -> Result<Option<Report>> {
    let row = sqlx::query(
        r#"
        SELECT r.workflow_id, r.schema_version, r.payload, r.captured_at
        FROM reports r
        JOIN workflow_runs w ON w.id = r.workflow_id
        WHERE w.user_id = ? AND w.status = 'completed'
        ORDER BY r.captured_at DESC, r.rowid DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| report_from_row(&r)).transpose()
}

pub async fn load_report(pool: &SqlitePool, workflow_id: Uuid) -> Result<Option<Report>> {
    let row = sqlx::query(
        "SELECT workflow_id, schema_version, payload, captured_at FROM reports WHERE workflow_id = ?",
    )
    .bind(workflow_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| report_from_row(&r)).transpose()
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let workflow_id: String = row.get("workflow_id");
    let payload: String = row.get("payload");
    let captured_at: String = row.get("captured_at");
    let schema_version: i64 = row.get("schema_version");

    Ok(Report {
        workflow_id: parse_uuid("workflow_id", &workflow_id)?,
        schema_version: schema_version.max(0) as u32,
        payload: serde_json::from_str(&payload)?,
        captured_at: parse_ts("captured_at", &captured_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory_pool;
    use crate::db::runs::{insert_run, load_run, update_run};
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn mark(pool: &SqlitePool, run: &WorkflowRun, status: RunStatus) {
        sqlx::query("UPDATE workflow_runs SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(run.id.to_string())
            .execute(pool)
            .await
            .unwrap();
    }

    fn report_for(run: &WorkflowRun, captured_at: chrono::DateTime<Utc>, marker: &str) -> Report {
        Report {
            workflow_id: run.id,
            schema_version: 2,
            payload: json!({ "marker": marker }),
            captured_at,
        }
    }

    fn insight() -> AiInsight {
        AiInsight {
            provider: "openai".to_string(),
            summary: "Summary".to_string(),
            breaking_insights: String::new(),
        }
    }

    #[tokio::test]
    async fn test_latest_report_is_newest_for_user() {
        let pool = init_in_memory_pool().await.unwrap();

        let older = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &older).await.unwrap();
        mark(&pool, &older, RunStatus::Completed).await;
        let newer = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &newer).await.unwrap();
        mark(&pool, &newer, RunStatus::Completed).await;
        let someone_else = WorkflowRun::new("user_2", "https://other.com");
        insert_run(&pool, &someone_else).await.unwrap();
        mark(&pool, &someone_else, RunStatus::Completed).await;

        let now = Utc::now();
        for (run, at, marker) in [
            (&older, now - Duration::hours(1), "old"),
            (&newer, now, "new"),
            (&someone_else, now + Duration::hours(1), "other"),
        ] {
            insert_report(&pool, &report_for(run, at, marker)).await.unwrap();
        }

        let latest = latest_report_for_user(&pool, "user_1").await.unwrap().unwrap();
        assert_eq!(latest.workflow_id, newer.id);
        assert_eq!(latest.payload["marker"], "new");
        assert!(latest_report_for_user(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_of_unfinished_run_is_not_latest() {
        let pool = init_in_memory_pool().await.unwrap();

        let completed = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &completed).await.unwrap();
        mark(&pool, &completed, RunStatus::Completed).await;
        let failed = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &failed).await.unwrap();
        mark(&pool, &failed, RunStatus::Failed).await;

        let now = Utc::now();
        insert_report(&pool, &report_for(&completed, now - Duration::hours(1), "good"))
            .await
            .unwrap();
        insert_report(&pool, &report_for(&failed, now, "orphan")).await.unwrap();

        let latest = latest_report_for_user(&pool, "user_1").await.unwrap().unwrap();
        assert_eq!(latest.payload["marker"], "good");
    }

    #[tokio::test]
    async fn test_commit_completed_run_writes_everything() {
        let pool = init_in_memory_pool().await.unwrap();
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &run).await.unwrap();
        run.transition_to(RunStatus::Running).unwrap();
        update_run(&pool, &run).await.unwrap();
        run.transition_to(RunStatus::Completed).unwrap();

        commit_completed_run(&pool, &run, &insight(), &report_for(&run, Utc::now(), "done"))
            .await
            .unwrap();

        let stored = load_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert!(load_report(&pool, run.id).await.unwrap().is_some());
        assert_eq!(insights::load_insight(&pool, run.id).await.unwrap(), Some(insight()));
    }

    #[tokio::test]
    async fn test_failed_status_write_rolls_back_report() {
        let pool = init_in_memory_pool().await.unwrap();
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &run).await.unwrap();
        run.transition_to(RunStatus::Running).unwrap();
        update_run(&pool, &run).await.unwrap();
        run.transition_to(RunStatus::Completed).unwrap();

        sqlx::query(
            r#"
            CREATE TRIGGER refuse_completion BEFORE UPDATE OF status ON workflow_runs
            WHEN NEW.status = 'completed'
            BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = commit_completed_run(&pool, &run, &insight(), &report_for(&run, Utc::now(), "lost")).await;
        assert!(result.is_err());

        assert_eq!(load_run(&pool, run.id).await.unwrap().unwrap().status, RunStatus::Running);
        assert!(load_report(&pool, run.id).await.unwrap().is_none());
        assert!(insights::load_insight(&pool, run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_skips_run_no_longer_running() {
        let pool = init_in_memory_pool().await.unwrap();
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &run).await.unwrap();
        run.transition_to(RunStatus::Running).unwrap();
        run.transition_to(RunStatus::Completed).unwrap();

        // Row is still queued
        let result = commit_completed_run(&pool, &run, &insight(), &report_for(&run, Utc::now(), "late")).await;
        assert!(result.is_err());
        assert!(load_report(&pool, run.id).await.unwrap().is_none());
        assert_eq!(load_run(&pool, run.id).await.unwrap().unwrap().status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_payload_stored_verbatim() {
        let pool = init_in_memory_pool().await.unwrap();
        let run = WorkflowRun::new("user_1", "https://example.com");
        insert_run(&pool, &run).await.unwrap();

        let payload = json!({ "overview": { "headline": "legacy" } });
        insert_report(
            &pool,
            &Report {
                workflow_id: run.id,
                schema_version: 1,
                payload: payload.clone(),
                captured_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let loaded = load_report(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(loaded.schema_version, 1);
        assert_eq!(loaded.payload, payload);
    }
}
