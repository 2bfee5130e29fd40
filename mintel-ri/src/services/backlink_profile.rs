//! Backlink adapter
//!
//! Strongest referring links for the target and each competitor. Authority is the
//! referring domain's rank rescaled from 0-1000 to 0-100.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{BacklinkMetric, CompetitorDomain, WorkflowContext};

const BACKLINKS_PATH: &str = "/v3/backlinks/backlinks/live";

/// Links requested per domain
const LINKS_PER_DOMAIN: u32 = 10;

#[derive(Debug, Deserialize)]
struct BacklinkItem {
    domain_from: Option<String>,
    url_from: Option<String>,
    #[serde(default)]
    domain_from_rank: f64,
    #[serde(default)]
    anchor: Option<String>,
}

pub struct BacklinkProfile {
    client: DataForSeoClient,
}

impl BacklinkProfile {
    pub fn new(client: DataForSeoClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext, competitors: &[CompetitorDomain]) -> Vec<BacklinkMetric> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Backlinks skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let targets: Vec<String> = std::iter::once(ctx.target_domain())
            .chain(competitors.iter().map(|c| c.domain.clone()))
            .collect();

        let lookups = targets.iter().map(|target| async move {
            let task = json!({
                "target": target,
                "mode": "one_per_domain",
                "order_by": ["domain_from_rank,desc"],
                "limit": LINKS_PER_DOMAIN,
            });
            (target, self.client.post_items::<BacklinkItem>(BACKLINKS_PATH, task).await)
        });

        let mut rows = Vec::new();
        for (target, outcome) in join_all(lookups).await {
            match outcome {
                Ok(items) => rows.extend(items.into_iter().filter_map(|item| {
                    let source = item.domain_from.or(item.url_from)?;
                    Some(BacklinkMetric {
                        target: target.clone(),
                        source,
                        authority: (item.domain_from_rank / 10.0).clamp(0.0, 100.0),
                        anchor_text: item.anchor.unwrap_or_default(),
                    })
                })),
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.workflow_id, target = %target, error = %e, "Backlink lookup failed");
                }
            }
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{config_for, jane_doe};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_authority_rescaled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BACKLINKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{ "status_code": 20000, "result": [{ "items": [
                    { "domain_from": "blog.example.org", "url_from": "https://blog.example.org/x", "domain_from_rank": 550, "anchor": "best crm" },
                    { "url_from": null, "domain_from": null, "domain_from_rank": 900 }
                ]}]}]
            })))
            .mount(&server)
            .await;

        let backlinks = BacklinkProfile::new(DataForSeoClient::from_config(
            &config_for(&server.uri()),
            reqwest::Client::new(),
        ));
        let rows = backlinks.fetch(&jane_doe(), &[]).await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target, "example.com");
        assert_eq!(rows[0].source, "blog.example.org");
        assert!((rows[0].authority - 55.0).abs() < 1e-9);
        assert_eq!(rows[0].anchor_text, "best crm");
    }
}
