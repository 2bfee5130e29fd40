//! PageSpeed Insights adapter
//!
//! Desktop and mobile strategies are requested concurrently and merged into one row
//! per Core Web Vital. Either strategy may fail without losing the other.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::http_executor::{HttpError, HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;
use crate::models::{AuditSource, TechnicalAudit, WorkflowContext};

pub const PAGESPEED_BASE_URL: &str = "https://www.googleapis.com";

/// (metric name, Lighthouse audit id)
const VITALS: &[(&str, &str)] = &[
    ("LCP", "largest-contentful-paint"),
    ("CLS", "cumulative-layout-shift"),
    ("FCP", "first-contentful-paint"),
    ("TBT", "total-blocking-time"),
    ("TTFB", "server-response-time"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PsiResponse {
    lighthouse_result: Option<LighthouseResult>,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    audits: HashMap<String, LighthouseAudit>,
    #[serde(default)]
    categories: HashMap<String, LighthouseCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseAudit {
    numeric_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LighthouseCategory {
    score: Option<f64>,
}

/// Metric values for one strategy
type StrategyMetrics = HashMap<&'static str, f64>;

pub struct PageSpeed {
    executor: HttpExecutor,
    base_url: String,
    api_key: Option<String>,
}

impl PageSpeed {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.pagespeed;
        Self {
            executor: HttpExecutor::new(client, "pagespeed", RetryPolicy::from(&config.http))
                .with_rate_limit(vendor.requests_per_second.unwrap_or(0)),
            base_url: vendor.base_url_or(PAGESPEED_BASE_URL),
            api_key: vendor.api_key().map(str::to_string),
        }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<TechnicalAudit> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(workflow_id = %ctx.workflow_id, "PageSpeed skipped: API key not configured");
            return Vec::new();
        };

        let (desktop, mobile) = tokio::join!(
            self.run_strategy(&ctx.website_url, "desktop", api_key),
            self.run_strategy(&ctx.website_url, "mobile", api_key),
        );

        let desktop = desktop
            .map_err(|e| tracing::warn!(workflow_id = %ctx.workflow_id, strategy = "desktop", error = %e, "PageSpeed failed"))
            .ok();
        let mobile = mobile
            .map_err(|e| tracing::warn!(workflow_id = %ctx.workflow_id, strategy = "mobile", error = %e, "PageSpeed failed"))
            .ok();

        merge(desktop.as_ref(), mobile.as_ref())
    }

    async fn run_strategy(&self, page_url: &str, strategy: &str, api_key: &str) -> Result<StrategyMetrics, HttpError> {
        let url = format!("{}/pagespeedonline/v5/runPagespeed", self.base_url);
        let response: PsiResponse = self
            .executor
            .execute_json(|c| {
                c.get(&url).query(&[
                    ("url", page_url),
                    ("strategy", strategy),
                    ("category", "performance"),
                    ("key", api_key),
                ])
            })
            .await?;

        let lighthouse = response
            .lighthouse_result
            .ok_or_else(|| HttpError::Decode("response has no lighthouseResult".to_string()))?;

        let mut metrics = StrategyMetrics::new();
        for (name, audit_id) in VITALS {
            if let Some(value) = lighthouse.audits.get(*audit_id).and_then(|a| a.numeric_value) {
                metrics.insert(*name, value);
            }
        }
        if let Some(score) = lighthouse.categories.get("performance").and_then(|c| c.score) {
            metrics.insert("performance_score", (score * 100.0).round());
        }

        Ok(metrics)
    }
}

fn merge(desktop: Option<&StrategyMetrics>, mobile: Option<&StrategyMetrics>) -> Vec<TechnicalAudit> {
    VITALS
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once("performance_score"))
        .filter_map(|metric| {
            let d = desktop.and_then(|m| m.get(metric).copied());
            let m = mobile.and_then(|m| m.get(metric).copied());
            (d.is_some() || m.is_some()).then(|| TechnicalAudit {
                source: AuditSource::PageSpeed,
                metric: metric.to_string(),
                desktop: d,
                mobile: m,
                detail: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{config_for, jane_doe};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn psi_body(lcp: f64, score: f64) -> serde_json::Value {
        json!({ "lighthouseResult": {
            "audits": {
                "largest-contentful-paint": { "numericValue": lcp },
                "cumulative-layout-shift": { "numericValue": 0.05 }
            },
            "categories": { "performance": { "score": score } }
        }})
    }

    #[tokio::test]
    async fn test_strategies_merged_per_metric() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pagespeedonline/v5/runPagespeed"))
            .and(query_param("strategy", "desktop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(psi_body(1200.0, 0.93)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pagespeedonline/v5/runPagespeed"))
            .and(query_param("strategy", "mobile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(psi_body(3400.0, 0.61)))
            .mount(&server)
            .await;

        let speed = PageSpeed::from_config(&config_for(&server.uri()), Client::new());
        let rows = speed.fetch(&jane_doe()).await;

        let lcp = rows.iter().find(|r| r.metric == "LCP").unwrap();
        assert_eq!(lcp.desktop, Some(1200.0));
        assert_eq!(lcp.mobile, Some(3400.0));
        let score = rows.iter().find(|r| r.metric == "performance_score").unwrap();
        assert_eq!(score.desktop, Some(93.0));
        assert_eq!(score.mobile, Some(61.0));
        assert!(rows.iter().all(|r| r.metric != "TBT"));
    }

    #[tokio::test]
    async fn test_one_failing_strategy_keeps_the_other() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("strategy", "desktop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(psi_body(1000.0, 0.9)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("strategy", "mobile"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let speed = PageSpeed::from_config(&config_for(&server.uri()), Client::new());
        let rows = speed.fetch(&jane_doe()).await;

        let lcp = rows.iter().find(|r| r.metric == "LCP").unwrap();
        assert_eq!(lcp.desktop, Some(1000.0));
        assert_eq!(lcp.mobile, None);
    }
}
