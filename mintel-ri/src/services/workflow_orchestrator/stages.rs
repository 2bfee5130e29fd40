//! Stage execution
//!
//! Each stage computes its output from the run context and the outputs of earlier
//! stages, persists its rows, and hands the output back to be merged into
//! `StageOutputs`. Collection stages never fail on vendor errors (adapters degrade to
//! empty output); database writes and primary LLM failures do.
//!
//! `persist_report` only prepares the report and insight rows. They are written
//! together with the run's `completed` status once every stage has succeeded.

use anyhow::{Context, Result};
use chrono::Utc;

use super::stage_graph::StageId;
use super::WorkflowOrchestrator;
use crate::db;
use crate::models::{
    BacklinkMetric, BusinessProfile, CompetitorDomain, Contact, ContentSentiment, CrawlPage,
    AiInsight, DomainMetric, IntelligenceReportPayload, KeywordMetric, NewsMention, Report, SerpResult,
    ShareOfVoiceSnapshot, TechnicalAudit, WorkflowContext, CURRENT_SCHEMA_VERSION,
};
use crate::services::aggregation::{assemble_payload, share_of_voice, AggregationInput};
use crate::services::insight_synthesis::{CollectedSignals, Synthesis};

/// Rows committed with the run's completion
#[derive(Debug)]
pub(super) struct PreparedReport {
    pub(super) insight: AiInsight,
    pub(super) report: Report,
}

/// Output of one stage
pub(super) enum StageOutput {
    Competitors(Vec<CompetitorDomain>),
    Serp(Vec<SerpResult>),
    Keywords(Vec<KeywordMetric>),
    Sentiment(Vec<ContentSentiment>),
    Crawl(Vec<CrawlPage>),
    DomainAnalytics(Vec<DomainMetric>),
    Backlinks(Vec<BacklinkMetric>),
    OnPage(Vec<TechnicalAudit>),
    PageSpeed(Vec<TechnicalAudit>),
    Business(Vec<BusinessProfile>),
    News(Vec<NewsMention>),
    Contacts(Vec<Contact>),
    Aggregated(Box<IntelligenceReportPayload>),
    Synthesized(Box<Synthesis>),
    Prepared(Box<PreparedReport>),
}

impl StageOutput {
    /// Rows produced, for progress events
    pub(super) fn records(&self) -> usize {
        match self {
            StageOutput::Competitors(rows) => rows.len(),
            StageOutput::Serp(rows) => rows.len(),
            StageOutput::Keywords(rows) => rows.len(),
            StageOutput::Sentiment(rows) => rows.len(),
            StageOutput::Crawl(rows) => rows.len(),
            StageOutput::DomainAnalytics(rows) => rows.len(),
            StageOutput::Backlinks(rows) => rows.len(),
            StageOutput::OnPage(rows) | StageOutput::PageSpeed(rows) => rows.len(),
            StageOutput::Business(rows) => rows.len(),
            StageOutput::News(rows) => rows.len(),
            StageOutput::Contacts(rows) => rows.len(),
            StageOutput::Aggregated(_) | StageOutput::Synthesized(_) | StageOutput::Prepared(_) => 1,
        }
    }
}

/// Accumulated outputs of completed stages for one run
#[derive(Default)]
pub(super) struct StageOutputs {
    competitors: Vec<CompetitorDomain>,
    serp: Vec<SerpResult>,
    keywords: Vec<KeywordMetric>,
    sentiment: Vec<ContentSentiment>,
    crawl_pages: Vec<CrawlPage>,
    domain_metrics: Vec<DomainMetric>,
    backlinks: Vec<BacklinkMetric>,
    audits: Vec<TechnicalAudit>,
    businesses: Vec<BusinessProfile>,
    news: Vec<NewsMention>,
    contacts: Vec<Contact>,
    payload: Option<IntelligenceReportPayload>,
    synthesis: Option<Synthesis>,
    prepared: Option<PreparedReport>,
}

impl StageOutputs {
    pub(super) fn apply(&mut self, output: StageOutput) {
        match output {
            StageOutput::Competitors(rows) => self.competitors = rows,
            StageOutput::Serp(rows) => self.serp = rows,
            StageOutput::Keywords(rows) => self.keywords = rows,
            StageOutput::Sentiment(rows) => self.sentiment = rows,
            StageOutput::Crawl(rows) => self.crawl_pages = rows,
            StageOutput::DomainAnalytics(rows) => self.domain_metrics = rows,
            StageOutput::Backlinks(rows) => self.backlinks = rows,
            StageOutput::OnPage(rows) | StageOutput::PageSpeed(rows) => self.audits.extend(rows),
            StageOutput::Business(rows) => self.businesses = rows,
            StageOutput::News(rows) => self.news = rows,
            StageOutput::Contacts(rows) => self.contacts = rows,
            StageOutput::Aggregated(payload) => self.payload = Some(*payload),
            StageOutput::Synthesized(synthesis) => self.synthesis = Some(*synthesis),
            StageOutput::Prepared(prepared) => self.prepared = Some(*prepared),
        }
    }

    /// Collection outputs without a report section, for the synthesis prompts
    pub(super) fn signals(&self) -> CollectedSignals<'_> {
        CollectedSignals {
            crawl_pages: &self.crawl_pages,
            domain_metrics: &self.domain_metrics,
            news: &self.news,
            contacts: &self.contacts,
        }
    }

    pub(super) fn take_prepared(&mut self) -> Option<PreparedReport> {
        self.prepared.take()
    }
}

impl WorkflowOrchestrator {
    /// Compute and persist one stage
    pub(super) async fn run_stage(
        &self,
        stage: StageId,
        ctx: &WorkflowContext,
        outputs: &StageOutputs,
    ) -> Result<StageOutput> {
        let adapters = &self.adapters;
        let wf = ctx.workflow_id;
        let pool = &self.db;

        let output = match stage {
            StageId::Competitors => {
                let rows = adapters.competitors.discover(ctx).await;
                db::stage_rows::insert_competitors(pool, wf, &rows).await?;
                StageOutput::Competitors(rows)
            }
            StageId::Serp => {
                let rows = adapters.serp.fetch(ctx).await;
                db::stage_rows::insert_serp_results(pool, wf, &rows).await?;
                StageOutput::Serp(rows)
            }
            StageId::Keywords => {
                let rows = adapters.keywords.fetch(ctx).await;
                db::stage_rows::insert_keyword_metrics(pool, wf, &rows).await?;
                StageOutput::Keywords(rows)
            }
            StageId::Sentiment => {
                let rows = adapters.sentiment.fetch(ctx).await;
                db::stage_rows::insert_sentiments(pool, wf, &rows).await?;
                StageOutput::Sentiment(rows)
            }
            StageId::Crawl => {
                let rows = adapters.crawl.fetch(ctx).await;
                db::stage_rows::insert_crawl_pages(pool, wf, &rows).await?;
                StageOutput::Crawl(rows)
            }
            StageId::DomainAnalytics => {
                let rows = adapters
                    .domain_analytics
                    .fetch(ctx, &outputs.competitors, &outputs.serp)
                    .await;
                db::stage_rows::insert_domain_metrics(pool, wf, &rows).await?;
                StageOutput::DomainAnalytics(rows)
            }
            StageId::Backlinks => {
                let rows = adapters.backlinks.fetch(ctx, &outputs.competitors).await;
                db::stage_rows::insert_backlinks(pool, wf, &rows).await?;
                StageOutput::Backlinks(rows)
            }
            StageId::OnPage => {
                let rows = adapters.onpage.fetch(ctx).await;
                db::stage_rows::insert_technical_audits(pool, wf, &rows).await?;
                StageOutput::OnPage(rows)
            }
            StageId::PageSpeed => {
                let rows = adapters.page_speed.fetch(ctx).await;
                db::stage_rows::insert_technical_audits(pool, wf, &rows).await?;
                StageOutput::PageSpeed(rows)
            }
            StageId::Business => {
                let rows = adapters.business.fetch(ctx, &outputs.competitors).await;
                db::stage_rows::insert_business_profiles(pool, wf, &rows).await?;
                StageOutput::Business(rows)
            }
            StageId::News => {
                let rows = adapters.news.fetch(ctx).await;
                db::stage_rows::insert_news_mentions(pool, wf, &rows).await?;
                StageOutput::News(rows)
            }
            StageId::Contacts => {
                let rows = adapters.contacts.fetch(ctx).await;
                db::stage_rows::insert_contacts(pool, wf, &rows).await?;
                StageOutput::Contacts(rows)
            }
            StageId::Aggregation => StageOutput::Aggregated(Box::new(self.aggregate(ctx, outputs).await?)),
            StageId::Synthesis => {
                let payload = outputs
                    .payload
                    .clone()
                    .context("Aggregated payload missing before synthesis")?;
                let synthesis = self
                    .synthesizer
                    .synthesize(ctx, payload, &outputs.signals())
                    .await
                    .context("Insight synthesis failed")?;
                StageOutput::Synthesized(Box::new(synthesis))
            }
            StageId::PersistReport => {
                let synthesis = outputs
                    .synthesis
                    .as_ref()
                    .context("Synthesis result missing before report persistence")?;
                StageOutput::Prepared(Box::new(prepare_report(ctx, synthesis)?))
            }
        };

        Ok(output)
    }

    /// Record this run's share of voice, then assemble every report section
    async fn aggregate(&self, ctx: &WorkflowContext, outputs: &StageOutputs) -> Result<IntelligenceReportPayload> {
        let captured_at = Utc::now();
        let snapshot = ShareOfVoiceSnapshot {
            captured_at,
            share_of_voice: share_of_voice(&ctx.target_domain(), &outputs.serp),
        };

        db::stage_rows::insert_share_of_voice(&self.db, ctx.workflow_id, &ctx.user_id, &snapshot).await?;
        let timeline = db::stage_rows::share_of_voice_timeline(&self.db, &ctx.user_id, ctx.workflow_id).await?;

        tracing::debug!(
            workflow_id = %ctx.workflow_id,
            share_of_voice = snapshot.share_of_voice,
            timeline_points = timeline.len(),
            "Share of voice recorded"
        );

        Ok(assemble_payload(AggregationInput {
            workflow_id: ctx.workflow_id,
            captured_at,
            timeline: &timeline,
            keyword_metrics: &outputs.keywords,
            sentiments: &outputs.sentiment,
            backlinks: &outputs.backlinks,
            audits: &outputs.audits,
            businesses: &outputs.businesses,
        }))
    }

}

fn prepare_report(ctx: &WorkflowContext, synthesis: &Synthesis) -> Result<PreparedReport> {
    let report = Report {
        workflow_id: ctx.workflow_id,
        schema_version: CURRENT_SCHEMA_VERSION,
        payload: serde_json::to_value(&synthesis.payload).context("Failed to serialize report payload")?,
        captured_at: synthesis.payload.summary.captured_at,
    };

    Ok(PreparedReport {
        insight: synthesis.insight.clone(),
        report,
    })
}
