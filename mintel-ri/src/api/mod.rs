//! HTTP API handlers for mintel-ri

pub mod auth;
pub mod health;
pub mod onboarding;
pub mod report;
pub mod sse;
pub mod workflows;

pub use auth::{AuthUser, StaticTokenVerifier, TokenVerifier};
pub use health::health_routes;
pub use onboarding::onboarding_routes;
pub use report::report_routes;
pub use sse::event_routes;
pub use workflows::workflow_routes;
