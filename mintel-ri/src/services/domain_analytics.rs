//! Domain analytics adapter
//!
//! Organic traffic estimates for the target, its competitors and the best-ranked
//! SERP domains. Lookups run concurrently; failed lookups are dropped.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{CompetitorDomain, DomainMetric, SerpResult, WorkflowContext};

const DOMAIN_RANK_PATH: &str = "/v3/dataforseo_labs/google/domain_rank_overview/live";

/// Domains looked up per run
pub const MAX_ANALYTICS_DOMAINS: usize = 6;

#[derive(Debug, Deserialize)]
struct RankItem {
    #[serde(default)]
    metrics: Option<RankMetrics>,
}

#[derive(Debug, Deserialize)]
struct RankMetrics {
    organic: Option<OrganicMetrics>,
}

#[derive(Debug, Deserialize)]
struct OrganicMetrics {
    #[serde(default)]
    etv: f64,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    pos_1: Option<u64>,
}

pub struct DomainAnalytics {
    client: DataForSeoClient,
}

impl DomainAnalytics {
    pub fn new(client: DataForSeoClient) -> Self {
        Self { client }
    }

    pub async fn fetch(
        &self,
        ctx: &WorkflowContext,
        competitors: &[CompetitorDomain],
        serp: &[SerpResult],
    ) -> Vec<DomainMetric> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Domain analytics skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let domains = domains_to_analyse(&ctx.target_domain(), competitors, serp);
        let lookups = domains.iter().map(|domain| async move {
            let task = json!({
                "target": domain,
                "location_name": ctx.location,
                "language_code": "en",
            });
            (domain, self.client.post_items::<RankItem>(DOMAIN_RANK_PATH, task).await)
        });

        let mut rows = Vec::new();
        for (domain, outcome) in join_all(lookups).await {
            match outcome {
                Ok(items) => {
                    let organic = items
                        .into_iter()
                        .find_map(|item| item.metrics.and_then(|m| m.organic));
                    if let Some(organic) = organic {
                        rows.push(DomainMetric {
                            domain: domain.clone(),
                            organic_traffic: organic.etv,
                            organic_keywords: organic.count,
                            rank: organic.pos_1.map(|p| p as f64),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.workflow_id, domain = %domain, error = %e, "Domain lookup failed");
                }
            }
        }

        rows
    }
}

/// Target first, then competitors, then SERP domains by best position
fn domains_to_analyse(target: &str, competitors: &[CompetitorDomain], serp: &[SerpResult]) -> Vec<String> {
    let mut by_position: Vec<&SerpResult> = serp.iter().collect();
    by_position.sort_by_key(|r| r.position);

    let candidates = std::iter::once(target.to_string())
        .chain(competitors.iter().map(|c| c.domain.clone()))
        .chain(by_position.into_iter().map(|r| r.domain.clone()));

    let mut domains: Vec<String> = Vec::new();
    for domain in candidates {
        if !domains.contains(&domain) {
            domains.push(domain);
        }
        if domains.len() == MAX_ANALYTICS_DOMAINS {
            break;
        }
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompetitorOrigin;
    use crate::services::test_support::{config_for, jane_doe};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn serp(domain: &str, position: u32) -> SerpResult {
        SerpResult {
            search_engine: "google".into(),
            keyword: "saas".into(),
            position,
            url: format!("https://{}/", domain),
            domain: domain.into(),
        }
    }

    #[test]
    fn test_domain_selection_order_and_cap() {
        let competitors = vec![
            CompetitorDomain { domain: "rival.io".into(), origin: CompetitorOrigin::User },
            CompetitorDomain { domain: "other.com".into(), origin: CompetitorOrigin::Api },
        ];
        let results = vec![
            serp("late.com", 9),
            serp("example.com", 1),
            serp("first.com", 2),
            serp("second.com", 3),
            serp("third.com", 4),
        ];

        let domains = domains_to_analyse("example.com", &competitors, &results);
        assert_eq!(
            domains,
            vec!["example.com", "rival.io", "other.com", "first.com", "second.com", "third.com"]
        );
    }

    #[tokio::test]
    async fn test_failed_lookups_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DOMAIN_RANK_PATH))
            .and(body_partial_json(json!([{ "target": "example.com" }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{ "status_code": 20000, "result": [{ "items": [{
                    "metrics": { "organic": { "etv": 1234.5, "count": 321, "pos_1": 12 } }
                }]}]}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(DOMAIN_RANK_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let analytics = DomainAnalytics::new(DataForSeoClient::from_config(
            &config_for(&server.uri()),
            reqwest::Client::new(),
        ));
        let competitors = vec![CompetitorDomain { domain: "rival.io".into(), origin: CompetitorOrigin::Api }];
        let rows = analytics.fetch(&jane_doe(), &competitors, &[]).await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].domain, "example.com");
        assert_eq!(rows[0].organic_keywords, 321);
    }
}
