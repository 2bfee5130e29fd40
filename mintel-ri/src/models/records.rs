//! Normalized adapter output
//!
//! One struct per stage row type. Adapters return these; the orchestrator persists
//! them keyed by workflow id. Rows are append-only.

use serde::{Deserialize, Serialize};

/// Where a competitor domain came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitorOrigin {
    /// Supplied on the onboarding form
    User,
    /// Domain-level competitors API
    Api,
    /// LLM free-text suggestion
    Llm,
}

impl CompetitorOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitorOrigin::User => "user",
            CompetitorOrigin::Api => "api",
            CompetitorOrigin::Llm => "llm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorDomain {
    pub domain: String,
    pub origin: CompetitorOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerpResult {
    pub search_engine: String,
    pub keyword: String,
    pub position: u32,
    pub url: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetric {
    pub keyword: String,
    pub volume: u64,
    pub cpc: f64,
    /// 0-100
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSentiment {
    /// positive / neutral / negative
    pub label: String,
    /// 0.0-1.0 share of analysed mentions
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlPage {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub word_count: u64,
    pub headings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMetric {
    pub domain: String,
    pub organic_traffic: f64,
    pub organic_keywords: u64,
    pub rank: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklinkMetric {
    /// Domain the link points at
    pub target: String,
    /// Referring page/domain
    pub source: String,
    /// Referring domain rank, 0-100
    pub authority: f64,
    pub anchor_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    OnPage,
    PageSpeed,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::OnPage => "onpage",
            AuditSource::PageSpeed => "pagespeed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAudit {
    pub source: AuditSource,
    pub metric: String,
    pub desktop: Option<f64>,
    pub mobile: Option<f64>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub domain: String,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub employees: Option<u64>,
    pub location: Option<String>,
    pub tech_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsMention {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    pub name: Option<String>,
    pub position: Option<String>,
    pub confidence: Option<f64>,
}

/// Share of voice captured for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareOfVoiceSnapshot {
    pub captured_at: chrono::DateTime<chrono::Utc>,
    pub share_of_voice: f64,
}

/// Narrative produced by the LLMs for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    pub provider: String,
    pub summary: String,
    pub breaking_insights: String,
}
