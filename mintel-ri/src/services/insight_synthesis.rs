//! AI insight synthesis
//!
//! 1. Secondary (web-connected) LLM: free-text breaking insights. Best effort.
//! 2. Primary LLM: strict JSON `{executive_summary, recommendations[]}`. Fatal on
//!    request failure; unparseable output becomes the executive summary verbatim.
//! 3. The result is merged into the report summary.
//!
//! Both prompts carry the report payload plus the collected signals that have no
//! report section of their own (crawl, domain analytics, news, contacts).

use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Write as _;
use thiserror::Error;

use super::http_executor::HttpError;
use super::llm_client::LlmClient;
use crate::models::{
    AiInsight, Contact, CrawlPage, DomainMetric, IntelligenceReportPayload, NewsMention, Recommendation,
    WorkflowContext,
};

const SECONDARY_SYSTEM_PROMPT: &str = "You are a market intelligence researcher with live web access. \
Report recent, concrete developments (launches, funding, pricing changes, press) about the company \
and its competitors. Plain text, at most 10 bullet points.";

const PRIMARY_SYSTEM_PROMPT: &str = "You are a senior marketing strategist. Using the report data, \
collected signals and breaking insights provided, respond with a JSON object only, shaped exactly as \
{\"executive_summary\": string, \"recommendations\": [{\"title\": string, \"description\": string, \
\"confidence\": number between 0 and 1}]}.";

/// Fatal synthesis failures
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Primary LLM request failed: {0}")]
    Primary(#[from] HttpError),

    #[error("Failed to serialize report for prompt: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Completed payload plus the narrative row stored alongside it
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub payload: IntelligenceReportPayload,
    pub insight: AiInsight,
}

/// Max entries per signal list rendered into a prompt
const SIGNAL_LIMIT: usize = 10;

/// Stage outputs that reach the LLMs as prompt context only
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectedSignals<'a> {
    pub crawl_pages: &'a [CrawlPage],
    pub domain_metrics: &'a [DomainMetric],
    pub news: &'a [NewsMention],
    pub contacts: &'a [Contact],
}

impl CollectedSignals<'_> {
    /// Plain-text prompt section; `(none)` when nothing was collected
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.crawl_pages.is_empty() {
            out.push_str("Website pages:\n");
            for page in self.crawl_pages.iter().take(SIGNAL_LIMIT) {
                let _ = write!(out, "- {}", page.title.as_deref().unwrap_or(&page.url));
                let _ = write!(out, " ({}, {} words)", page.url, page.word_count);
                if let Some(description) = page.description.as_deref().filter(|d| !d.is_empty()) {
                    let _ = write!(out, ": {}", description);
                }
                if !page.headings.is_empty() {
                    let headings: Vec<&str> = page.headings.iter().take(5).map(String::as_str).collect();
                    let _ = write!(out, " | headings: {}", headings.join("; "));
                }
                out.push('\n');
            }
        }

        if !self.domain_metrics.is_empty() {
            out.push_str("Domain analytics:\n");
            for metric in self.domain_metrics.iter().take(SIGNAL_LIMIT) {
                let _ = write!(
                    out,
                    "- {}: organic traffic {:.0}, organic keywords {}",
                    metric.domain, metric.organic_traffic, metric.organic_keywords
                );
                if let Some(rank) = metric.rank {
                    let _ = write!(out, ", rank {:.0}", rank);
                }
                out.push('\n');
            }
        }

        if !self.news.is_empty() {
            out.push_str("Recent news:\n");
            for mention in self.news.iter().take(SIGNAL_LIMIT) {
                let _ = write!(out, "- {} ({}", mention.title, mention.source);
                if let Some(published_at) = &mention.published_at {
                    let _ = write!(out, ", {}", published_at);
                }
                let _ = writeln!(out, ") {}", mention.url);
            }
        }

        if !self.contacts.is_empty() {
            let _ = writeln!(out, "Public contacts found: {}", self.contacts.len());
            for contact in self.contacts.iter().take(SIGNAL_LIMIT) {
                match (&contact.name, &contact.position) {
                    (Some(name), Some(position)) => {
                        let _ = writeln!(out, "- {}, {}", name, position);
                    }
                    (None, Some(position)) => {
                        let _ = writeln!(out, "- {}", position);
                    }
                    (Some(name), None) => {
                        let _ = writeln!(out, "- {}", name);
                    }
                    (None, None) => {}
                }
            }
        }

        if out.is_empty() {
            "(none)".to_string()
        } else {
            out.trim_end().to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    executive_summary: String,
    #[serde(default)]
    recommendations: Vec<RecommendationResponse>,
}

#[derive(Debug, Deserialize)]
struct RecommendationResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: Value,
}

pub struct InsightSynthesizer {
    primary: LlmClient,
    secondary: LlmClient,
}

impl InsightSynthesizer {
    pub fn new(primary: LlmClient, secondary: LlmClient) -> Self {
        Self { primary, secondary }
    }

    pub async fn synthesize(
        &self,
        ctx: &WorkflowContext,
        mut payload: IntelligenceReportPayload,
        signals: &CollectedSignals<'_>,
    ) -> Result<Synthesis, SynthesisError> {
        let report_json = serde_json::to_string(&payload)?;
        let signals_text = signals.render();

        let breaking_insights = self.breaking_insights(ctx, &report_json, &signals_text).await;

        let user_prompt = format!(
            "Company: {} ({})\nIndustry: {}\nLocation: {}\n\nReport data (JSON):\n{}\n\nCollected signals:\n{}\n\nBreaking insights:\n{}",
            ctx.target_domain(),
            ctx.website_url,
            ctx.industry,
            ctx.location,
            report_json,
            signals_text,
            if breaking_insights.is_empty() { "(none)" } else { breaking_insights.as_str() },
        );

        let raw = self.primary.complete(PRIMARY_SYSTEM_PROMPT, &user_prompt).await?;
        let (executive_summary, recommendations) = parse_summary(&raw);

        tracing::info!(
            workflow_id = %ctx.workflow_id,
            recommendations = recommendations.len(),
            "Insight synthesis complete"
        );

        payload.summary.executive_summary = executive_summary.clone();
        payload.summary.recommendations = recommendations;

        Ok(Synthesis {
            payload,
            insight: AiInsight {
                provider: self.primary.provider().to_string(),
                summary: executive_summary,
                breaking_insights,
            },
        })
    }

    async fn breaking_insights(&self, ctx: &WorkflowContext, report_json: &str, signals_text: &str) -> String {
        if !self.secondary.has_credentials() {
            tracing::debug!(workflow_id = %ctx.workflow_id, "Secondary LLM not configured, skipping breaking insights");
            return String::new();
        }

        let prompt = format!(
            "Company website: {}\nIndustry: {}\nLocation: {}\n\nCurrent report data:\n{}\n\nCollected signals:\n{}",
            ctx.website_url, ctx.industry, ctx.location, report_json, signals_text
        );

        match self.secondary.complete(SECONDARY_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Secondary LLM failed, continuing without breaking insights");
                String::new()
            }
        }
    }
}

/// Parse the primary LLM's answer. Never fails: text that is not the expected JSON
/// object becomes the executive summary with no recommendations.
pub fn parse_summary(raw: &str) -> (String, Vec<Recommendation>) {
    let body = strip_code_fence(raw);

    let parsed: SummaryResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Primary LLM returned non-JSON output, using raw text as summary");
            return (raw.trim().to_string(), Vec::new());
        }
    };

    let mut recommendations: Vec<Recommendation> = parsed
        .recommendations
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .map(|r| Recommendation {
            title: r.title.trim().to_string(),
            description: r.description.trim().to_string(),
            confidence: clamp_confidence(&r.confidence),
        })
        .collect();

    recommendations.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    (parsed.executive_summary.trim().to_string(), recommendations)
}

/// Numbers or numeric strings, clamped into [0, 1]; anything else is 0
fn clamp_confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Body of a fenced block (```json ... ```), or the trimmed input
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json") up to the end of the line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
