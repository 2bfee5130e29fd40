//! Onboarding trigger
//!
//! POST /api/onboarding validates the intake form, applies abuse controls, creates a
//! QUEUED run, stores the profile and hands the run to the job queue. The response is
//! sent before any stage executes. A trigger rejected with 409 leaves the stored
//! profile of the active run untouched.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use uuid::Uuid;

use mintel_common::events::IntelEvent;

use super::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{OnboardingRequest, RunFailure, RunStatus, WorkflowRun};
use crate::AppState;

/// POST /api/onboarding response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub workflow_id: Uuid,
    pub status: RunStatus,
}

/// Client address: first X-Forwarded-For hop, then X-Real-IP, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// POST /api/onboarding
pub async fn trigger_onboarding(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<OnboardingRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let profile = request.into_profile(&user_id)?;

    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    if state.abuse.enforce_ip_cap {
        if let Some(ip) = ip.as_deref() {
            let others = db::fingerprints::other_users_for_ip(&state.db, ip, &user_id).await?;
            if others >= i64::from(state.abuse.max_signups_per_ip) {
                tracing::warn!(user_id = %user_id, ip = %ip, others, "Signup rejected by per-IP cap");
                return Err(ApiError::Forbidden(
                    "Too many accounts registered from this network".to_string(),
                ));
            }
        }
    }

    if db::runs::has_active_run(&state.db, &user_id).await? {
        return Err(ApiError::Conflict("A report is already being generated".to_string()));
    }

    let mut run = WorkflowRun::new(user_id.clone(), profile.website_url.clone());
    if let Err(e) = db::runs::insert_run(&state.db, &run).await {
        // Lost a race with a concurrent trigger for the same user
        if db::is_unique_violation(&e) {
            return Err(ApiError::Conflict("A report is already being generated".to_string()));
        }
        return Err(e.into());
    }

    // This trigger now owns the active run
    if let Err(e) = db::profiles::upsert_profile(&state.db, &profile).await {
        abandon_run(&state, &mut run, anyhow::anyhow!("Failed to store onboarding profile: {}", e)).await?;
        return Err(e.into());
    }
    if let Some(ip) = ip.as_deref() {
        db::fingerprints::record_fingerprint(&state.db, &user_id, ip).await?;
    }

    state.event_bus.emit_lossy(IntelEvent::RunQueued {
        workflow_id: run.id,
        user_id: user_id.clone(),
        timestamp: Utc::now(),
    });

    if let Err(e) = state.queue.submit(run.id) {
        abandon_run(&state, &mut run, anyhow::Error::new(e.clone())).await?;
        return Err(ApiError::Unavailable(e.to_string()));
    }

    tracing::info!(
        workflow_id = %run.id,
        user_id = %user_id,
        website_url = %run.website_url,
        "Report workflow queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            workflow_id: run.id,
            status: run.status,
        }),
    ))
}

/// Mark a run that never reached a worker as failed
async fn abandon_run(state: &AppState, run: &mut WorkflowRun, error: anyhow::Error) -> ApiResult<()> {
    tracing::error!(workflow_id = %run.id, error = %error, "Could not hand run to a worker");
    run.metadata.error = Some(RunFailure::from_error(&error, None));
    run.transition_to(RunStatus::Failed)?;
    db::runs::update_run(&state.db, run).await?;
    Ok(())
}

pub fn onboarding_routes() -> Router<AppState> {
    Router::new().route("/api/onboarding", post(trigger_onboarding))
}
