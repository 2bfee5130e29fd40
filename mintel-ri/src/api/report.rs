//! Report retrieval
//!
//! GET /api/report returns the caller's newest report, upgraded to the current payload
//! shape. The stored row is left untouched.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::RunStatus;
use crate::services::migrate_to_current;
use crate::AppState;

/// 202 body while the caller's run has not produced a report yet
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResponse {
    pub status: &'static str,
    pub workflow_status: RunStatus,
    pub triggered_at: DateTime<Utc>,
}

/// GET /api/report
pub async fn get_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Response> {
    if let Some(report) = db::reports::latest_report_for_user(&state.db, &user_id).await? {
        let payload = migrate_to_current(report.schema_version, &report.payload).map_err(|e| {
            ApiError::Internal(format!("Report {} unreadable: {}", report.workflow_id, e))
        })?;

        tracing::debug!(
            user_id = %user_id,
            workflow_id = %report.workflow_id,
            schema_version = report.schema_version,
            "Serving report"
        );
        return Ok(Json(payload).into_response());
    }

    match db::runs::latest_run_for_user(&state.db, &user_id).await? {
        Some(run) if !run.is_terminal() => Ok((
            StatusCode::ACCEPTED,
            Json(ProcessingResponse {
                status: "processing",
                workflow_status: run.status,
                triggered_at: run.triggered_at,
            }),
        )
            .into_response()),
        _ => Ok((StatusCode::NOT_FOUND, Json(json!({ "status": "not_found" }))).into_response()),
    }
}

pub fn report_routes() -> Router<AppState> {
    Router::new().route("/api/report", get(get_report))
}
