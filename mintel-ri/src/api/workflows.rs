//! Run status
//!
//! Exposes state and timestamps only. Failure detail stays in run metadata for
//! operators.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{RunStatus, WorkflowRun};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub occurred_at: DateTime<Utc>,
}

/// GET /api/workflows/:id response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusResponse {
    pub workflow_id: Uuid,
    pub status: RunStatus,
    pub triggered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailureSummary>,
    /// Rows persisted per stage table
    pub stage_rows: BTreeMap<String, i64>,
}

impl WorkflowStatusResponse {
    fn from_run(run: &WorkflowRun, stage_rows: BTreeMap<String, i64>) -> Self {
        let failed = (run.status == RunStatus::Failed).then(|| FailureSummary {
            occurred_at: run
                .metadata
                .error
                .as_ref()
                .map(|e| e.occurred_at)
                .or(run.completed_at)
                .unwrap_or(run.triggered_at),
        });

        Self {
            workflow_id: run.id,
            status: run.status,
            triggered_at: run.triggered_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            failed,
            stage_rows,
        }
    }
}

/// GET /api/workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<WorkflowStatusResponse>> {
    let not_found = || ApiError::NotFound(format!("Workflow {}", workflow_id));

    let id = Uuid::parse_str(&workflow_id).map_err(|_| not_found())?;

    // Other users' runs are indistinguishable from missing ones
    let run = db::runs::load_run(&state.db, id)
        .await?
        .filter(|run| run.user_id == user_id)
        .ok_or_else(not_found)?;

    let stage_rows = db::stage_rows::count_stage_rows(&state.db, id).await?;

    Ok(Json(WorkflowStatusResponse::from_run(&run, stage_rows)))
}

pub fn workflow_routes() -> Router<AppState> {
    Router::new().route("/api/workflows/:id", get(get_workflow))
}
