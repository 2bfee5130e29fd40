//! Intelligence report payload
//!
//! The JSON shape served by `GET /api/report`. Stored payloads carry a
//! `schema_version`; older versions are upgraded on read by `services::payload_migrations`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version written by the current pipeline
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceReportPayload {
    pub summary: ReportSummary,
    #[serde(rename = "serpTimeline")]
    pub serp_timeline: Vec<TimelinePoint>,
    #[serde(rename = "keywordOpportunities")]
    pub keyword_opportunities: Vec<KeywordOpportunity>,
    pub sentiment: Vec<SentimentEntry>,
    pub backlinks: Vec<BacklinkEntry>,
    #[serde(rename = "coreWebVitals")]
    pub core_web_vitals: Vec<WebVital>,
    #[serde(rename = "techStack")]
    pub tech_stack: Vec<TechStackEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub executive_summary: String,
    pub recommendations: Vec<Recommendation>,
}

impl Default for ReportSummary {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            captured_at: Utc::now(),
            executive_summary: String::new(),
            recommendations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    /// Always within [0, 1]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub captured_at: DateTime<Utc>,
    pub share_of_voice: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOpportunity {
    pub keyword: String,
    pub volume: u64,
    pub difficulty: f64,
    #[serde(rename = "ctrPotential")]
    pub ctr_potential: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentEntry {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklinkEntry {
    pub source: String,
    pub authority: f64,
    #[serde(rename = "anchorText")]
    pub anchor_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebVital {
    pub metric: String,
    pub desktop: Option<f64>,
    pub mobile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStackEntry {
    pub competitor: String,
    pub categories: Vec<String>,
}

/// Stored report row
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub workflow_id: Uuid,
    pub schema_version: u32,
    /// Raw stored JSON (may be an older schema version)
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}
