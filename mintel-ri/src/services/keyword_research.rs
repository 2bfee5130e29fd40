//! Keyword metrics adapter
//!
//! Without user target keywords, keywords are first discovered from the target site;
//! if discovery yields nothing the industry itself is used. Metrics
//! (volume, CPC, difficulty) are then fetched in one overview task.

use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{KeywordMetric, WorkflowContext};

const KEYWORDS_FOR_SITE_PATH: &str = "/v3/dataforseo_labs/google/keywords_for_site/live";
const KEYWORD_OVERVIEW_PATH: &str = "/v3/dataforseo_labs/google/keyword_overview/live";

/// Keywords kept from site discovery
const DISCOVERY_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct KeywordItem {
    keyword: String,
    #[serde(default)]
    keyword_info: Option<KeywordInfo>,
    #[serde(default)]
    keyword_properties: Option<KeywordProperties>,
}

#[derive(Debug, Deserialize)]
struct KeywordInfo {
    search_volume: Option<u64>,
    cpc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct KeywordProperties {
    keyword_difficulty: Option<f64>,
}

impl From<KeywordItem> for KeywordMetric {
    fn from(item: KeywordItem) -> Self {
        let info = item.keyword_info;
        KeywordMetric {
            keyword: item.keyword.to_lowercase(),
            volume: info.as_ref().and_then(|i| i.search_volume).unwrap_or(0),
            cpc: info.as_ref().and_then(|i| i.cpc).unwrap_or(0.0),
            difficulty: item
                .keyword_properties
                .and_then(|p| p.keyword_difficulty)
                .unwrap_or(0.0)
                .clamp(0.0, 100.0),
        }
    }
}

pub struct KeywordResearch {
    client: DataForSeoClient,
}

impl KeywordResearch {
    pub fn new(client: DataForSeoClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<KeywordMetric> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Keyword research skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let keywords = if ctx.target_keywords.is_empty() {
            let discovered = self.discover(ctx).await;
            if discovered.is_empty() {
                vec![ctx.industry.trim().to_lowercase()]
            } else {
                discovered
            }
        } else {
            ctx.target_keywords.clone()
        };

        let task = json!({
            "keywords": keywords,
            "location_name": ctx.location,
            "language_code": "en",
        });

        match self.client.post_items::<KeywordItem>(KEYWORD_OVERVIEW_PATH, task).await {
            Ok(items) => items.into_iter().map(KeywordMetric::from).collect(),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Keyword overview failed");
                Vec::new()
            }
        }
    }

    /// Keywords the target site already ranks for
    async fn discover(&self, ctx: &WorkflowContext) -> Vec<String> {
        let task = json!({
            "target": ctx.target_domain(),
            "location_name": ctx.location,
            "language_code": "en",
            "limit": DISCOVERY_LIMIT,
        });

        match self.client.post_items::<KeywordItem>(KEYWORDS_FOR_SITE_PATH, task).await {
            Ok(items) => {
                let mut keywords: Vec<String> = Vec::new();
                for item in items {
                    let keyword = item.keyword.trim().to_lowercase();
                    if !keyword.is_empty() && !keywords.contains(&keyword) {
                        keywords.push(keyword);
                    }
                }
                keywords.truncate(DISCOVERY_LIMIT);
                tracing::debug!(workflow_id = %ctx.workflow_id, count = keywords.len(), "Discovered site keywords");
                keywords
            }
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Keyword discovery failed");
                Vec::new()
            }
        }
    }
}
