//! Timeline and competitive aggregation
//!
//! Pure functions turning stage rows into report sections. No I/O.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::models::{
    AuditSource, BacklinkEntry, BacklinkMetric, BusinessProfile, ContentSentiment,
    IntelligenceReportPayload, KeywordMetric, KeywordOpportunity, ReportSummary, SentimentEntry,
    SerpResult, ShareOfVoiceSnapshot, TechStackEntry, TechnicalAudit, TimelinePoint, WebVital,
};
use crate::utils::same_domain;

/// Organic click-through rate at position 1
pub const TOP_POSITION_CTR: f64 = 0.28;

/// Keyword opportunities kept in the report
pub const MAX_OPPORTUNITIES: usize = 20;

/// Backlinks kept in the report
pub const MAX_BACKLINKS: usize = 20;

/// Organic CTR by position (1-based). Positions past the table get the tail value.
const CTR_CURVE: [f64; 10] = [0.28, 0.15, 0.11, 0.08, 0.07, 0.05, 0.04, 0.03, 0.03, 0.02];
const CTR_TAIL: f64 = 0.01;

pub fn position_ctr(position: u32) -> f64 {
    match position {
        0 => 0.0,
        p => CTR_CURVE.get(p as usize - 1).copied().unwrap_or(CTR_TAIL),
    }
}

/// CTR-weighted share of captured SERP results held by the target domain, in [0, 1]
pub fn share_of_voice(target_domain: &str, serp: &[SerpResult]) -> f64 {
    let total: f64 = serp.iter().map(|r| position_ctr(r.position)).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let owned: f64 = serp
        .iter()
        .filter(|r| same_domain(&r.domain, target_domain))
        .map(|r| position_ctr(r.position))
        .sum();

    (owned / total).clamp(0.0, 1.0)
}

/// Estimated monthly clicks at a top position: `round(volume × 0.28 × (1 − difficulty/100))`
pub fn ctr_potential(volume: u64, difficulty: f64) -> u64 {
    let ease = 1.0 - difficulty.clamp(0.0, 100.0) / 100.0;
    (volume as f64 * TOP_POSITION_CTR * ease).round() as u64
}

/// Highest-potential keywords first, one entry per keyword, at most 20
pub fn keyword_opportunities(metrics: &[KeywordMetric]) -> Vec<KeywordOpportunity> {
    let mut opportunities: Vec<KeywordOpportunity> = Vec::new();
    for metric in metrics {
        if opportunities.iter().any(|o| o.keyword == metric.keyword) {
            continue;
        }
        opportunities.push(KeywordOpportunity {
            keyword: metric.keyword.clone(),
            volume: metric.volume,
            difficulty: metric.difficulty,
            ctr_potential: ctr_potential(metric.volume, metric.difficulty),
        });
    }

    opportunities.sort_by(|a, b| {
        b.ctr_potential
            .cmp(&a.ctr_potential)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    opportunities.truncate(MAX_OPPORTUNITIES);
    opportunities
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Rows feeding one report
pub struct AggregationInput<'a> {
    pub workflow_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub timeline: &'a [ShareOfVoiceSnapshot],
    pub keyword_metrics: &'a [KeywordMetric],
    pub sentiments: &'a [ContentSentiment],
    pub backlinks: &'a [BacklinkMetric],
    pub audits: &'a [TechnicalAudit],
    pub businesses: &'a [BusinessProfile],
}

/// Assemble every section of the report; the summary narrative is left empty
pub fn assemble_payload(input: AggregationInput<'_>) -> IntelligenceReportPayload {
    let serp_timeline = input
        .timeline
        .iter()
        .map(|s| TimelinePoint {
            captured_at: s.captured_at,
            share_of_voice: s.share_of_voice,
        })
        .collect();

    let sentiment = input
        .sentiments
        .iter()
        .map(|s| SentimentEntry {
            label: s.label.clone(),
            score: s.score,
        })
        .collect();

    let mut sorted_links: Vec<&BacklinkMetric> = input.backlinks.iter().collect();
    sorted_links.sort_by(|a, b| by_score_desc(a.authority, b.authority));
    let mut backlinks: Vec<BacklinkEntry> = Vec::new();
    for link in sorted_links {
        if backlinks.iter().any(|b| b.source == link.source) {
            continue;
        }
        backlinks.push(BacklinkEntry {
            source: link.source.clone(),
            authority: link.authority,
            anchor_text: link.anchor_text.clone(),
        });
        if backlinks.len() == MAX_BACKLINKS {
            break;
        }
    }

    let core_web_vitals = input
        .audits
        .iter()
        .filter(|a| a.source == AuditSource::PageSpeed)
        .map(|a| WebVital {
            metric: a.metric.clone(),
            desktop: a.desktop,
            mobile: a.mobile,
        })
        .collect();

    let tech_stack = input
        .businesses
        .iter()
        .filter(|b| !b.tech_categories.is_empty())
        .map(|b| TechStackEntry {
            competitor: b.domain.clone(),
            categories: b.tech_categories.clone(),
        })
        .collect();

    IntelligenceReportPayload {
        summary: ReportSummary {
            id: input.workflow_id,
            captured_at: input.captured_at,
            executive_summary: String::new(),
            recommendations: Vec::new(),
        },
        serp_timeline,
        keyword_opportunities: keyword_opportunities(input.keyword_metrics),
        sentiment,
        backlinks,
        core_web_vitals,
        tech_stack,
    }
}
