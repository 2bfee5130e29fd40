//! Content sentiment adapter
//!
//! Reads the positive/negative/neutral connotation distribution of web mentions of
//! the target domain and reports each label's share of the total.

use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{ContentSentiment, WorkflowContext};

const SENTIMENT_PATH: &str = "/v3/content_analysis/sentiment_analysis/live";

#[derive(Debug, Deserialize)]
struct SentimentResult {
    #[serde(default)]
    positive_connotation_distribution: Option<Distribution>,
}

#[derive(Debug, Default, Deserialize)]
struct Distribution {
    #[serde(default)]
    positive: f64,
    #[serde(default)]
    neutral: f64,
    #[serde(default)]
    negative: f64,
}

pub struct ContentSentimentAnalyzer {
    client: DataForSeoClient,
}

impl ContentSentimentAnalyzer {
    pub fn new(client: DataForSeoClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<ContentSentiment> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Sentiment analysis skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let task = json!({ "keyword": ctx.target_domain() });
        match self.client.post_task::<SentimentResult>(SENTIMENT_PATH, task).await {
            Ok(results) => results
                .into_iter()
                .find_map(|r| r.positive_connotation_distribution)
                .map(shares)
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Sentiment analysis failed");
                Vec::new()
            }
        }
    }
}

/// Convert raw counts into [0, 1] shares. An empty distribution yields no rows.
fn shares(dist: Distribution) -> Vec<ContentSentiment> {
    let counts = [
        ("positive", dist.positive.max(0.0)),
        ("neutral", dist.neutral.max(0.0)),
        ("negative", dist.negative.max(0.0)),
    ];
    let total: f64 = counts.iter().map(|(_, c)| c).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    counts
        .iter()
        .map(|(label, count)| ContentSentiment {
            label: label.to_string(),
            score: (count / total).clamp(0.0, 1.0),
        })
        .collect()
}
