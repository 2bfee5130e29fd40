//! LLM insight persistence
//!
//! Insights are only written as part of a run's completion transaction, see
//! `reports::commit_completed_run`.

use mintel_common::Result;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::AiInsight;

pub(crate) async fn insert_insight(
    conn: &mut SqliteConnection,
    workflow_id: &str,
    insight: &AiInsight,
    created_at: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ai_insights (workflow_id, provider, summary, breaking_insights, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(workflow_id)
    .bind(&insight.provider)
    .bind(&insight.summary)
    .bind(&insight.breaking_insights)
    .bind(created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Insight stored for a run, if any
pub async fn load_insight(pool: &SqlitePool, workflow_id: Uuid) -> Result<Option<AiInsight>> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT provider, summary, breaking_insights FROM ai_insights WHERE workflow_id = ?")
            .bind(workflow_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(provider, summary, breaking_insights)| AiInsight {
        provider,
        summary,
        breaking_insights,
    }))
}
