//! Site crawl adapter (Firecrawl scrape of the target homepage)

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::http_executor::{HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;
use crate::models::{CrawlPage, WorkflowContext};

pub const FIRECRAWL_BASE_URL: &str = "https://api.firecrawl.dev";

/// Headings kept per page
const MAX_HEADINGS: usize = 20;

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    metadata: ScrapeMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeMetadata {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

pub struct CrawlInsights {
    executor: HttpExecutor,
    base_url: String,
    api_key: Option<String>,
}

impl CrawlInsights {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.firecrawl;
        Self {
            executor: HttpExecutor::new(client, "firecrawl", RetryPolicy::from(&config.http))
                .with_rate_limit(vendor.requests_per_second.unwrap_or(0)),
            base_url: vendor.base_url_or(FIRECRAWL_BASE_URL),
            api_key: vendor.api_key().map(str::to_string),
        }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<CrawlPage> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Crawl skipped: Firecrawl API key not configured");
            return Vec::new();
        };

        let url = format!("{}/v1/scrape", self.base_url);
        let body = json!({
            "url": ctx.website_url,
            "formats": ["markdown"],
            "onlyMainContent": true,
        });

        let response: ScrapeResponse = match self
            .executor
            .execute_json(|c| c.post(&url).bearer_auth(api_key).json(&body))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Crawl failed");
                return Vec::new();
            }
        };

        match response.data {
            Some(data) if response.success => vec![page_from(&ctx.website_url, data)],
            _ => {
                tracing::warn!(workflow_id = %ctx.workflow_id, "Crawl returned no content");
                Vec::new()
            }
        }
    }
}

fn page_from(requested_url: &str, data: ScrapeData) -> CrawlPage {
    let headings = data
        .markdown
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            line.starts_with('#')
                .then(|| line.trim_start_matches('#').trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .take(MAX_HEADINGS)
        .collect();

    CrawlPage {
        url: data.metadata.source_url.unwrap_or_else(|| requested_url.to_string()),
        title: data.metadata.title,
        description: data.metadata.description,
        word_count: data.markdown.split_whitespace().count() as u64,
        headings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{config_for, jane_doe};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_scrape_extracts_headings_and_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "markdown": "# Example CRM\nSell more with less.\n## Pricing\nPlans for teams",
                    "metadata": { "title": "Example", "description": "CRM for teams", "sourceURL": "https://example.com/" }
                }
            })))
            .mount(&server)
            .await;

        let crawler = CrawlInsights::from_config(&config_for(&server.uri()), Client::new());
        let pages = crawler.fetch(&jane_doe()).await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].headings, vec!["Example CRM", "Pricing"]);
        assert_eq!(pages[0].title.as_deref(), Some("Example"));
        assert_eq!(pages[0].word_count, 12);
    }

    #[tokio::test]
    async fn test_missing_key_yields_empty() {
        let crawler = CrawlInsights::from_config(&ServiceConfig::default(), Client::new());
        assert!(crawler.fetch(&jane_doe()).await.is_empty());
    }
}
