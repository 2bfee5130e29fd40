//! SERP tracking adapter
//!
//! Queries Google organic results for up to `serp_keyword_cap` keywords concurrently
//! and records the top organic positions.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{SerpResult, WorkflowContext};
use crate::utils::normalize_domain;

const SERP_PATH: &str = "/v3/serp/google/organic/live/advanced";
const SERP_DEPTH: u32 = 10;

#[derive(Debug, Deserialize)]
struct SerpTaskResult {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    items: Option<Vec<SerpItem>>,
}

#[derive(Debug, Deserialize)]
struct SerpItem {
    #[serde(rename = "type")]
    kind: String,
    rank_group: Option<u32>,
    url: Option<String>,
    domain: Option<String>,
}

pub struct SerpTracker {
    client: DataForSeoClient,
    keyword_cap: usize,
}

impl SerpTracker {
    pub fn new(client: DataForSeoClient, keyword_cap: usize) -> Self {
        Self { client, keyword_cap }
    }

    /// Keywords queried for a run: the user's targets, else industry variants
    pub fn keywords_for(&self, ctx: &WorkflowContext) -> Vec<String> {
        let mut keywords: Vec<String> = if ctx.target_keywords.is_empty() {
            let industry = ctx.industry.trim().to_lowercase();
            let location = ctx.location.trim().to_lowercase();
            vec![industry.clone(), format!("{} {}", industry, location)]
        } else {
            ctx.target_keywords.clone()
        };
        keywords.retain(|k| !k.trim().is_empty());
        keywords.dedup();
        keywords.truncate(self.keyword_cap);
        keywords
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<SerpResult> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "SERP tracking skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let keywords = self.keywords_for(ctx);
        let lookups = keywords.iter().map(|keyword| async move {
            let task = json!({
                "keyword": keyword,
                "location_name": ctx.location,
                "language_code": "en",
                "depth": SERP_DEPTH,
            });
            (keyword, self.client.post_task::<SerpTaskResult>(SERP_PATH, task).await)
        });

        let mut rows = Vec::new();
        for (keyword, outcome) in join_all(lookups).await {
            match outcome {
                Ok(results) => rows.extend(normalize(keyword, results)),
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.workflow_id, keyword = %keyword, error = %e, "SERP lookup failed");
                }
            }
        }

        rows
    }
}

fn normalize(keyword: &str, results: Vec<SerpTaskResult>) -> Vec<SerpResult> {
    let mut rows: Vec<SerpResult> = results
        .into_iter()
        .flat_map(|result| {
            let keyword = result.keyword.unwrap_or_else(|| keyword.to_string());
            result
                .items
                .unwrap_or_default()
                .into_iter()
                .filter(|item| item.kind == "organic")
                .filter_map(move |item| {
                    let url = item.url?;
                    let domain = item
                        .domain
                        .as_deref()
                        .and_then(normalize_domain)
                        .or_else(|| normalize_domain(&url))?;
                    Some(SerpResult {
                        search_engine: "google".to_string(),
                        keyword: keyword.clone(),
                        position: item.rank_group?,
                        url,
                        domain,
                    })
                })
        })
        .collect();

    rows.sort_by_key(|r| r.position);
    rows.truncate(SERP_DEPTH as usize);
    rows
}
