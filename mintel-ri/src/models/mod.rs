//! Data models for mintel-ri
//!
//! - Workflow run state machine
//! - Onboarding intake and workflow context
//! - Normalized stage records
//! - Report payload

pub mod onboarding;
pub mod records;
pub mod report;
pub mod workflow_run;

pub use onboarding::{OnboardingProfile, OnboardingRequest, WorkflowContext};
pub use records::{
    AiInsight, AuditSource, BacklinkMetric, BusinessProfile, CompetitorDomain, CompetitorOrigin,
    Contact, ContentSentiment, CrawlPage, DomainMetric, KeywordMetric, NewsMention, SerpResult,
    ShareOfVoiceSnapshot, TechnicalAudit,
};
pub use report::{
    BacklinkEntry, IntelligenceReportPayload, KeywordOpportunity, Recommendation, Report,
    ReportSummary, SentimentEntry, TechStackEntry, TimelinePoint, WebVital,
    CURRENT_SCHEMA_VERSION,
};
pub use workflow_run::{RunFailure, RunMetadata, RunStatus, StateTransition, WorkflowRun};
