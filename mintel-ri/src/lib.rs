//! mintel-ri library interface
//!
//! Marketing-intelligence report pipeline: onboarding intake, vendor data collection,
//! LLM synthesis and report retrieval. Exposed as a library for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mintel_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::TokenVerifier;
use crate::config::AbuseConfig;
use crate::services::JobQueue;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Run lifecycle events for SSE subscribers
    pub event_bus: EventBus,
    /// Hands triggered runs to the worker pool
    pub queue: JobQueue,
    pub verifier: Arc<dyn TokenVerifier>,
    pub abuse: AbuseConfig,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        queue: JobQueue,
        verifier: Arc<dyn TokenVerifier>,
        abuse: AbuseConfig,
    ) -> Self {
        Self {
            db,
            event_bus,
            queue,
            verifier,
            abuse,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::onboarding_routes())
        .merge(api::report_routes())
        .merge(api::workflow_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
