//! Report workflow orchestrator
//!
//! Drives one run through QUEUED → RUNNING → {COMPLETED | FAILED}.
//!
//! # Stage Progression
//! competitors → serp → keywords → sentiment → crawl → domain_analytics → backlinks →
//! onpage → pagespeed → business → news → contacts → aggregation → synthesis →
//! persist_report
//!
//! Stages run one after another in that order unless `pipeline.parallel_stages` is
//! set, in which case each layer of the stage graph runs concurrently.
//!
//! # Failure Handling
//! Errors are caught once, here. The run is marked FAILED with the error chain, the
//! failing stage and per-stage timings in its metadata. The whole stage sequence
//! races the configured wall-clock budget.
//!
//! # Completion
//! The report, its insight row and the COMPLETED status are committed in a single
//! transaction after the stages finish. If that commit fails the run is marked FAILED
//! at `persist_report` and nothing of the report remains.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use mintel_common::events::{EventBus, IntelEvent};

use crate::config::ServiceConfig;
use crate::db;
use crate::models::{RunFailure, RunStatus, WorkflowContext, WorkflowRun};
use crate::services::{
    build_http_client, BacklinkProfile, BusinessEnrichment, CompetitorDiscovery, ContactEnrichment,
    ContentSentimentAnalyzer, CrawlInsights, DataForSeoClient, DomainAnalytics, HttpError,
    InsightSynthesizer, KeywordResearch, LlmClient, NewsSearch, OnPageAudit, PageSpeed, SerpTracker,
};

mod stage_graph;
mod stages;

pub use stage_graph::{layers, StageId};
use stages::{PreparedReport, StageOutput, StageOutputs};

/// Every source adapter, built once from configuration
pub struct SourceAdapters {
    pub competitors: CompetitorDiscovery,
    pub serp: SerpTracker,
    pub keywords: KeywordResearch,
    pub sentiment: ContentSentimentAnalyzer,
    pub crawl: CrawlInsights,
    pub domain_analytics: DomainAnalytics,
    pub backlinks: BacklinkProfile,
    pub onpage: OnPageAudit,
    pub page_speed: PageSpeed,
    pub business: BusinessEnrichment,
    pub news: NewsSearch,
    pub contacts: ContactEnrichment,
}

impl SourceAdapters {
    /// DataForSEO-backed adapters share one client, so they share its pacing limiter
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let dataforseo = DataForSeoClient::from_config(config, client.clone());

        Self {
            competitors: CompetitorDiscovery::new(
                dataforseo.clone(),
                LlmClient::primary(config, client.clone()),
                config.pipeline.max_competitors,
            ),
            serp: SerpTracker::new(dataforseo.clone(), config.pipeline.serp_keyword_cap),
            keywords: KeywordResearch::new(dataforseo.clone()),
            sentiment: ContentSentimentAnalyzer::new(dataforseo.clone()),
            crawl: CrawlInsights::from_config(config, client.clone()),
            domain_analytics: DomainAnalytics::new(dataforseo.clone()),
            backlinks: BacklinkProfile::new(dataforseo.clone()),
            onpage: OnPageAudit::new(dataforseo),
            page_speed: PageSpeed::from_config(config, client.clone()),
            business: BusinessEnrichment::from_config(config, client.clone()),
            news: NewsSearch::from_config(config, client.clone()),
            contacts: ContactEnrichment::from_config(config, client),
        }
    }
}

/// Why a run did not complete
struct StageFailure {
    stage: Option<StageId>,
    error: anyhow::Error,
    is_timeout: bool,
}

impl StageFailure {
    fn setup(error: anyhow::Error) -> Self {
        Self {
            stage: None,
            error,
            is_timeout: false,
        }
    }
}

/// Per-run bookkeeping that must survive the stage future being dropped on timeout
#[derive(Default)]
struct RunProgress {
    timings_ms: Mutex<BTreeMap<String, u64>>,
    in_flight: Mutex<Vec<StageId>>,
}

impl RunProgress {
    fn started(&self, stage: StageId) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }

    fn finished(&self, stage: StageId, elapsed_ms: u64) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| *s != stage);
        self.timings_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stage.to_string(), elapsed_ms);
    }

    /// Earliest (canonical order) stage still executing
    fn current_stage(&self) -> Option<StageId> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .min()
            .copied()
    }

    fn timings(&self) -> BTreeMap<String, u64> {
        self.timings_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Workflow orchestrator service
pub struct WorkflowOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    adapters: SourceAdapters,
    synthesizer: InsightSynthesizer,
    run_timeout: Option<Duration>,
    parallel_stages: bool,
}

impl WorkflowOrchestrator {
    /// Build the orchestrator and every adapter from configuration
    pub fn new(db: SqlitePool, event_bus: EventBus, config: &ServiceConfig) -> Result<Self, HttpError> {
        let client = build_http_client(&config.http)?;
        let synthesizer = InsightSynthesizer::new(
            LlmClient::primary(config, client.clone()),
            LlmClient::secondary(config, client.clone()),
        );

        Ok(Self {
            db,
            event_bus,
            adapters: SourceAdapters::from_config(config, client),
            synthesizer,
            run_timeout: config.pipeline.run_timeout(),
            parallel_stages: config.pipeline.parallel_stages,
        })
    }

    /// Override the wall-clock budget (None disables it)
    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Execute one queued run to a terminal state
    ///
    /// Returns the final status. `Err` means the run could not be loaded or its state
    /// could not be written; pipeline failures are recorded on the run and reported as
    /// `Ok(RunStatus::Failed)`.
    pub async fn execute(&self, workflow_id: Uuid) -> Result<RunStatus> {
        let mut run = db::runs::load_run(&self.db, workflow_id)
            .await?
            .with_context(|| format!("Workflow run not found: {}", workflow_id))?;

        if run.status != RunStatus::Queued {
            tracing::warn!(
                workflow_id = %workflow_id,
                status = %run.status,
                "Run is not queued, skipping"
            );
            return Ok(run.status);
        }

        let profile = db::profiles::load_profile(&self.db, &run.user_id).await?;
        let start_time = Instant::now();

        run.transition_to(RunStatus::Running)?;
        db::runs::update_run(&self.db, &run).await?;
        self.event_bus.emit_lossy(IntelEvent::RunStarted {
            workflow_id,
            user_id: run.user_id.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            workflow_id = %workflow_id,
            user_id = %run.user_id,
            website_url = %run.website_url,
            parallel = self.parallel_stages,
            "Starting report workflow"
        );

        let progress = RunProgress::default();
        let outcome = match profile {
            Some(profile) => {
                let ctx = WorkflowContext::from_profile(workflow_id, &profile);
                self.run_with_budget(&ctx, &progress).await
            }
            None => Err(StageFailure::setup(anyhow!(
                "Onboarding profile missing for user {}",
                run.user_id
            ))),
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        run.metadata.timings_ms = progress.timings();
        run.metadata.total_ms = Some(duration_ms);

        match outcome {
            Ok(prepared) => {
                let mut completed = run.clone();
                completed.transition_to(RunStatus::Completed)?;

                match db::reports::commit_completed_run(&self.db, &completed, &prepared.insight, &prepared.report)
                    .await
                {
                    Ok(()) => {
                        run = completed;
                        tracing::info!(workflow_id = %workflow_id, duration_ms, "Report workflow completed");
                        self.event_bus.emit_lossy(IntelEvent::RunCompleted {
                            workflow_id,
                            user_id: run.user_id.clone(),
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                    }
                    Err(e) => {
                        let failure = StageFailure {
                            stage: Some(StageId::PersistReport),
                            error: anyhow::Error::new(e).context("Failed to commit report"),
                            is_timeout: false,
                        };
                        self.record_failure(&mut run, failure).await?;
                    }
                }
            }
            Err(failure) => self.record_failure(&mut run, failure).await?,
        }

        Ok(run.status)
    }

    /// Fallback when `execute` itself errored: mark the run failed if it is not
    /// already terminal
    pub async fn fail_run(&self, workflow_id: Uuid, error: &anyhow::Error) -> Result<()> {
        let Some(mut run) = db::runs::load_run(&self.db, workflow_id).await? else {
            return Ok(());
        };
        if run.is_terminal() {
            return Ok(());
        }

        let failure = StageFailure::setup(anyhow!("{:#}", error));
        self.record_failure(&mut run, failure).await
    }

    async fn record_failure(&self, run: &mut WorkflowRun, failure: StageFailure) -> Result<()> {
        let stage = failure.stage.map(|s| s.to_string());

        tracing::error!(
            workflow_id = %run.id,
            stage = stage.as_deref().unwrap_or("setup"),
            is_timeout = failure.is_timeout,
            error = ?failure.error,
            "Report workflow failed"
        );

        run.metadata.error = Some(RunFailure::from_error(&failure.error, stage));
        run.metadata.is_timeout = failure.is_timeout;
        run.transition_to(RunStatus::Failed)?;
        db::runs::update_run(&self.db, run).await?;

        self.event_bus.emit_lossy(IntelEvent::RunFailed {
            workflow_id: run.id,
            user_id: run.user_id.clone(),
            is_timeout: failure.is_timeout,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn run_with_budget(
        &self,
        ctx: &WorkflowContext,
        progress: &RunProgress,
    ) -> Result<PreparedReport, StageFailure> {
        let Some(budget) = self.run_timeout else {
            return self.run_stages(ctx, progress).await;
        };

        match tokio::time::timeout(budget, self.run_stages(ctx, progress)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(StageFailure {
                stage: progress.current_stage(),
                error: anyhow!("Run exceeded its {} ms wall-clock budget", budget.as_millis()),
                is_timeout: true,
            }),
        }
    }

    async fn run_stages(&self, ctx: &WorkflowContext, progress: &RunProgress) -> Result<PreparedReport, StageFailure> {
        let mut outputs = StageOutputs::default();

        if self.parallel_stages {
            for layer in layers() {
                let results = join_all(
                    layer
                        .iter()
                        .map(|stage| self.timed_stage(*stage, ctx, &outputs, progress)),
                )
                .await;
                for result in results {
                    outputs.apply(result?);
                }
            }
        } else {
            for stage in StageId::ALL {
                let output = self.timed_stage(stage, ctx, &outputs, progress).await?;
                outputs.apply(output);
            }
        }

        outputs.take_prepared().ok_or_else(|| StageFailure {
            stage: Some(StageId::PersistReport),
            error: anyhow!("Report was not prepared"),
            is_timeout: false,
        })
    }

    async fn timed_stage(
        &self,
        stage: StageId,
        ctx: &WorkflowContext,
        outputs: &StageOutputs,
        progress: &RunProgress,
    ) -> Result<StageOutput, StageFailure> {
        progress.started(stage);
        let start = Instant::now();
        let result = self.run_stage(stage, ctx, outputs).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        progress.finished(stage, elapsed_ms);

        match result {
            Ok(output) => {
                let records = output.records();
                tracing::debug!(workflow_id = %ctx.workflow_id, stage = %stage, records, elapsed_ms, "Stage completed");
                self.event_bus.emit_lossy(IntelEvent::StageCompleted {
                    workflow_id: ctx.workflow_id,
                    user_id: ctx.user_id.clone(),
                    stage: stage.to_string(),
                    records,
                    duration_ms: elapsed_ms,
                    timestamp: Utc::now(),
                });
                Ok(output)
            }
            Err(error) => Err(StageFailure {
                stage: Some(stage),
                error: error.context(format!("Stage {} failed", stage)),
                is_timeout: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OnboardingRequest, WorkflowRun};
    use crate::services::test_support::config_for;
    use serde_json::json;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUMMARY: &str = r#"{"executive_summary":"Grow organic reach","recommendations":[{"title":"SEO","description":"Target long tail","confidence":0.8}]}"#;

    /// Every vendor answers 500 except the primary LLM, which answers `primary`
    async fn vendor_server(primary: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(primary)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        server
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": content } }]
        }))
    }

    async fn queued_run(pool: &SqlitePool) -> WorkflowRun {
        let request = OnboardingRequest {
            full_name: Some("Jane Doe".to_string()),
            website_url: Some("https://example.com".to_string()),
            industry: Some("SaaS".to_string()),
            location: Some("United States".to_string()),
            ..Default::default()
        };
        let profile = request.into_profile("user_jane").unwrap();
        db::profiles::upsert_profile(pool, &profile).await.unwrap();

        let run = WorkflowRun::new("user_jane", "https://example.com");
        db::runs::insert_run(pool, &run).await.unwrap();
        run
    }

    async fn orchestrator(server: &MockServer, parallel: bool) -> (WorkflowOrchestrator, SqlitePool, EventBus) {
        let pool = db::init_in_memory_pool().await.unwrap();
        let bus = EventBus::new(100);
        let mut config = config_for(&server.uri());
        config.pipeline.parallel_stages = parallel;
        let orchestrator = WorkflowOrchestrator::new(pool.clone(), bus.clone(), &config).unwrap();
        (orchestrator, pool, bus)
    }

    #[tokio::test]
    async fn test_vendor_failures_still_complete() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, bus) = orchestrator(&server, false).await;
        let mut rx = bus.subscribe();
        let run = queued_run(&pool).await;

        let status = orchestrator.execute(run.id).await.unwrap();
        assert_eq!(status, RunStatus::Completed);

        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.metadata.timings_ms.len(), StageId::ALL.len());
        assert!(stored.metadata.error.is_none());

        let report = db::reports::load_report(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(report.schema_version, 2);
        assert_eq!(report.payload["summary"]["executive_summary"], "Grow organic reach");
        assert_eq!(report.payload["summary"]["id"], run.id.to_string());
        assert_eq!(report.payload["serpTimeline"].as_array().unwrap().len(), 1);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type().to_string());
        }
        assert_eq!(kinds.first().map(String::as_str), Some("RunStarted"));
        assert_eq!(kinds.last().map(String::as_str), Some("RunCompleted"));
        assert_eq!(kinds.iter().filter(|k| *k == "StageCompleted").count(), StageId::ALL.len());
    }

    #[tokio::test]
    async fn test_parallel_layers_complete() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, true).await;
        let run = queued_run(&pool).await;

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Completed);
        assert!(db::reports::load_report(&pool, run.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_primary_llm_failure_fails_run_without_report() {
        let server = vendor_server(ResponseTemplate::new(500)).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, false).await;
        let run = queued_run(&pool).await;

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Failed);

        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        let error = stored.metadata.error.unwrap();
        assert_eq!(error.stage.as_deref(), Some("synthesis"));
        assert!(error.chain.len() >= 2);
        assert!(!stored.metadata.is_timeout);
        assert!(db::reports::load_report(&pool, run.id).await.unwrap().is_none());
        // Collection stages still persisted their timings
        assert!(stored.metadata.timings_ms.contains_key("competitors"));
    }

    #[tokio::test]
    async fn test_timeout_marks_run_failed() {
        let server = vendor_server(completion(SUMMARY).set_delay(Duration::from_secs(5))).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, false).await;
        let orchestrator = orchestrator.with_run_timeout(Some(Duration::from_millis(300)));
        let run = queued_run(&pool).await;

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Failed);

        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        assert!(stored.metadata.is_timeout);
        // The competitor LLM fallback is the first call to hit the delay
        assert_eq!(stored.metadata.error.unwrap().stage.as_deref(), Some("competitors"));
    }

    #[tokio::test]
    async fn test_missing_profile_fails_run() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, false).await;
        let run = WorkflowRun::new("ghost", "https://example.com");
        db::runs::insert_run(&pool, &run).await.unwrap();

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Failed);
        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        assert!(stored.metadata.error.unwrap().message.contains("profile missing"));
    }

    #[tokio::test]
    async fn test_non_queued_run_is_skipped() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, false).await;
        let run = queued_run(&pool).await;

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Completed);
        // Second execution leaves the terminal run alone
        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Completed);
        assert!(orchestrator.execute(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_run_fallback() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, _bus) = orchestrator(&server, false).await;
        let run = queued_run(&pool).await;

        orchestrator
            .fail_run(run.id, &anyhow!("database is gone"))
            .await
            .unwrap();

        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored.metadata.error.unwrap().message.contains("database is gone"));
    }

    #[tokio::test]
    async fn test_failed_completion_commit_leaves_no_report() {
        let server = vendor_server(completion(SUMMARY)).await;
        let (orchestrator, pool, bus) = orchestrator(&server, false).await;
        let mut rx = bus.subscribe();
        let run = queued_run(&pool).await;

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

        assert_eq!(orchestrator.execute(run.id).await.unwrap(), RunStatus::Failed);

        let stored = db::runs::load_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.metadata.error.unwrap().stage.as_deref(), Some("persist_report"));
        assert!(db::reports::load_report(&pool, run.id).await.unwrap().is_none());
        assert!(db::insights::load_insight(&pool, run.id).await.unwrap().is_none());
        assert!(db::reports::latest_report_for_user(&pool, "user_jane").await.unwrap().is_none());

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event.event_type().to_string());
        }
        assert_eq!(last.as_deref(), Some("RunFailed"));
    }
}
