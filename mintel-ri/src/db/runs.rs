//! Workflow run persistence
//!
//! Status transitions are validated in `WorkflowRun::transition_to`; this module only
//! stores the result.

use mintel_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{format_ts, parse_opt_ts, parse_ts, parse_uuid};
use crate::models::{RunMetadata, RunStatus, WorkflowRun};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const RUN_COLUMNS: &str =
    "id, user_id, website_url, status, triggered_at, started_at, completed_at, metadata";

/// Insert a new run
///
/// Fails with a UNIQUE violation if the user already has a queued or running run
/// (see `db::is_unique_violation`).
pub async fn insert_run(pool: &SqlitePool, run: &WorkflowRun) -> Result<()> {
    let id = run.id.to_string();
    let status = run.status.as_str();
    let triggered_at = format_ts(&run.triggered_at);
    let started_at = run.started_at.as_ref().map(format_ts);
    let completed_at = run.completed_at.as_ref().map(format_ts);
    let metadata = serde_json::to_string(&run.metadata)?;

    retry_on_lock("insert_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (
                id, user_id, website_url, status, triggered_at, started_at, completed_at, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&run.user_id)
        .bind(&run.website_url)
        .bind(status)
        .bind(&triggered_at)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(&metadata)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Persist status, timestamps and metadata of an existing run
pub async fn update_run(pool: &SqlitePool, run: &WorkflowRun) -> Result<()> {
    let id = run.id.to_string();
    let status = run.status.as_str();
    let started_at = run.started_at.as_ref().map(format_ts);
    let completed_at = run.completed_at.as_ref().map(format_ts);
    let metadata = serde_json::to_string(&run.metadata)?;

    let rows_affected = retry_on_lock("update_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = ?, started_at = ?, completed_at = ?, metadata = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(&metadata)
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    })
    .await?;

    if rows_affected == 0 {
        return Err(mintel_common::Error::NotFound(format!("Workflow run {}", run.id)));
    }

    Ok(())
}

/// Load a run by id
pub async fn load_run(pool: &SqlitePool, id: Uuid) -> Result<Option<WorkflowRun>> {
    let row = sqlx::query(&format!("SELECT {} FROM workflow_runs WHERE id = ?", RUN_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// Most recently triggered run for a user
pub async fn latest_run_for_user(pool: &SqlitePool, user_id: &str) -> Result<Option<WorkflowRun>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM workflow_runs WHERE user_id = ? ORDER BY triggered_at DESC, rowid DESC LIMIT 1",
        RUN_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// True if the user has a queued or running run
pub async fn has_active_run(pool: &SqlitePool, user_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM workflow_runs WHERE user_id = ? AND status IN ('queued', 'running')",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// All runs in a status, oldest first
pub async fn runs_with_status(pool: &SqlitePool, status: RunStatus) -> Result<Vec<WorkflowRun>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM workflow_runs WHERE status = ? ORDER BY triggered_at ASC",
        RUN_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

fn run_from_row(row: &SqliteRow) -> Result<WorkflowRun> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let triggered_at: String = row.get("triggered_at");
    let metadata: String = row.get("metadata");

    let metadata: RunMetadata = serde_json::from_str(&metadata).map_err(|e| {
        mintel_common::Error::Internal(format!("Failed to deserialize run metadata: {}", e))
    })?;

    Ok(WorkflowRun {
        id: parse_uuid("id", &id)?,
        user_id: row.get("user_id"),
        website_url: row.get("website_url"),
        status: status.parse()?,
        triggered_at: parse_ts("triggered_at", &triggered_at)?,
        started_at: parse_opt_ts("started_at", row.get("started_at"))?,
        completed_at: parse_opt_ts("completed_at", row.get("completed_at"))?,
        metadata,
    })
}
