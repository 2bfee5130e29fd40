//! Service modules for the report pipeline
//!
//! - HTTP executor and vendor clients
//! - Source adapters (one per data source)
//! - Aggregation, insight synthesis and payload migrations
//! - Workflow orchestrator, job queue and worker pool

pub mod aggregation;
pub mod backlink_profile;
pub mod business_enrichment;
pub mod competitor_discovery;
pub mod contact_enrichment;
pub mod content_sentiment;
pub mod crawl_insights;
pub mod dataforseo_client;
pub mod domain_analytics;
pub mod http_executor;
pub mod insight_synthesis;
pub mod job_queue;
pub mod keyword_research;
pub mod llm_client;
pub mod news_search;
pub mod onpage_audit;
pub mod page_speed;
pub mod payload_migrations;
pub mod serp_tracker;
pub mod workflow_orchestrator;

#[cfg(test)]
pub(crate) mod test_support;

pub use backlink_profile::BacklinkProfile;
pub use business_enrichment::BusinessEnrichment;
pub use competitor_discovery::CompetitorDiscovery;
pub use contact_enrichment::ContactEnrichment;
pub use content_sentiment::ContentSentimentAnalyzer;
pub use crawl_insights::CrawlInsights;
pub use dataforseo_client::DataForSeoClient;
pub use domain_analytics::DomainAnalytics;
pub use http_executor::{build_http_client, HttpError, HttpExecutor, RetryPolicy};
pub use insight_synthesis::{InsightSynthesizer, Synthesis, SynthesisError};
pub use job_queue::{recover_runs, JobQueue, JobReceiver, QueueError, RecoveryReport, WorkerPool};
pub use keyword_research::KeywordResearch;
pub use llm_client::LlmClient;
pub use news_search::NewsSearch;
pub use onpage_audit::OnPageAudit;
pub use page_speed::PageSpeed;
pub use payload_migrations::{migrate_to_current, MigrationError};
pub use serp_tracker::SerpTracker;
pub use workflow_orchestrator::{SourceAdapters, StageId, WorkflowOrchestrator};
