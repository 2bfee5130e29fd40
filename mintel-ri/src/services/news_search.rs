//! News mention adapter
//!
//! Two searches run concurrently: the company (domain stem) and the industry. Results
//! are merged newest-first, de-duplicated by URL.

use reqwest::Client;
use serde::Deserialize;

use super::http_executor::{HttpError, HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;
use crate::models::{NewsMention, WorkflowContext};
use crate::utils::domain::domain_stem;

pub const NEWS_BASE_URL: &str = "https://newsapi.org";

/// Mentions kept per run
pub const MAX_MENTIONS: usize = 10;

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    source: Option<ArticleSource>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct NewsSearch {
    executor: HttpExecutor,
    base_url: String,
    api_key: Option<String>,
}

impl NewsSearch {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.news;
        Self {
            executor: HttpExecutor::new(client, "news", RetryPolicy::from(&config.http))
                .with_rate_limit(vendor.requests_per_second.unwrap_or(0)),
            base_url: vendor.base_url_or(NEWS_BASE_URL),
            api_key: vendor.api_key().map(str::to_string),
        }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<NewsMention> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(workflow_id = %ctx.workflow_id, "News search skipped: API key not configured");
            return Vec::new();
        };

        let company_query = format!("\"{}\"", domain_stem(&ctx.target_domain()));
        let industry_query = ctx.industry.trim().to_string();

        let (company, industry) = tokio::join!(
            self.search(&company_query, api_key),
            self.search(&industry_query, api_key),
        );

        let mut mentions = Vec::new();
        for (query, outcome) in [(&company_query, company), (&industry_query, industry)] {
            match outcome {
                Ok(articles) => mentions.extend(articles),
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.workflow_id, query = %query, error = %e, "News search failed");
                }
            }
        }

        merge_mentions(mentions)
    }

    async fn search(&self, query: &str, api_key: &str) -> Result<Vec<NewsMention>, HttpError> {
        let url = format!("{}/v2/everything", self.base_url);
        let page_size = MAX_MENTIONS.to_string();
        let response: EverythingResponse = self
            .executor
            .execute_json(|c| {
                c.get(&url).header("X-Api-Key", api_key).query(&[
                    ("q", query),
                    ("language", "en"),
                    ("sortBy", "publishedAt"),
                    ("pageSize", page_size.as_str()),
                ])
            })
            .await?;

        Ok(response
            .articles
            .into_iter()
            .filter_map(|a| {
                Some(NewsMention {
                    title: a.title?,
                    url: a.url?,
                    source: a.source.and_then(|s| s.name).unwrap_or_default(),
                    published_at: a.published_at,
                })
            })
            .collect())
    }
}

fn merge_mentions(mut mentions: Vec<NewsMention>) -> Vec<NewsMention> {
    // RFC 3339 strings sort chronologically
    mentions.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let mut merged: Vec<NewsMention> = Vec::new();
    for mention in mentions {
        if !merged.iter().any(|m| m.url == mention.url) {
            merged.push(mention);
        }
        if merged.len() == MAX_MENTIONS {
            break;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{config_for, jane_doe};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(title: &str, url: &str, at: &str) -> serde_json::Value {
        json!({ "title": title, "url": url, "source": { "name": "Wire" }, "publishedAt": at })
    }

    #[tokio::test]
    async fn test_results_merged_and_deduplicated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(header("X-Api-Key", "test-key"))
            .and(query_param("q", "\"example\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "articles": [
                article("Example launches", "https://news.test/a", "2026-10-01T00:00:00Z"),
                article("Shared story", "https://news.test/shared", "2026-10-03T00:00:00Z")
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "SaaS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "articles": [
                article("Shared story", "https://news.test/shared", "2026-10-03T00:00:00Z"),
                { "title": null, "url": "https://news.test/untitled" }
            ]})))
            .mount(&server)
            .await;

        let news = NewsSearch::from_config(&config_for(&server.uri()), Client::new());
        let mentions = news.fetch(&jane_doe()).await;

        let urls: Vec<&str> = mentions.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, vec!["https://news.test/shared", "https://news.test/a"]);
    }

    #[test]
    fn test_merge_caps_mentions() {
        let many: Vec<NewsMention> = (0..25)
            .map(|i| NewsMention {
                title: format!("t{}", i),
                url: format!("https://news.test/{}", i),
                source: "Wire".into(),
                published_at: None,
            })
            .collect();
        assert_eq!(merge_mentions(many).len(), MAX_MENTIONS);
    }
}
