//! On-page audit adapter
//!
//! Instant page audit of the homepage: overall on-page score, load timings and every
//! failed check from a fixed list of problem flags.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::dataforseo_client::DataForSeoClient;
use crate::models::{AuditSource, TechnicalAudit, WorkflowContext};

const INSTANT_PAGES_PATH: &str = "/v3/on_page/instant_pages";

/// Checks where `true` indicates a problem
const PROBLEM_CHECKS: &[&str] = &[
    "no_title",
    "no_description",
    "no_h1_tag",
    "is_broken",
    "is_http",
    "high_loading_time",
    "no_image_alt",
    "no_favicon",
    "duplicate_title_tag",
    "low_content_rate",
];

#[derive(Debug, Deserialize)]
struct PageItem {
    onpage_score: Option<f64>,
    #[serde(default)]
    page_timing: Option<PageTiming>,
    #[serde(default)]
    checks: HashMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct PageTiming {
    time_to_interactive: Option<f64>,
    dom_complete: Option<f64>,
}

pub struct OnPageAudit {
    client: DataForSeoClient,
}

impl OnPageAudit {
    pub fn new(client: DataForSeoClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<TechnicalAudit> {
        if !self.client.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "On-page audit skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let task = json!({ "url": ctx.website_url, "enable_javascript": false });
        match self.client.post_items::<PageItem>(INSTANT_PAGES_PATH, task).await {
            Ok(items) => items.into_iter().next().map(audit_rows).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "On-page audit failed");
                Vec::new()
            }
        }
    }
}

fn audit_rows(page: PageItem) -> Vec<TechnicalAudit> {
    let row = |metric: &str, value: Option<f64>, detail: Option<String>| TechnicalAudit {
        source: AuditSource::OnPage,
        metric: metric.to_string(),
        desktop: value,
        mobile: None,
        detail,
    };

    let mut rows = Vec::new();
    if let Some(score) = page.onpage_score {
        rows.push(row("onpage_score", Some(score), None));
    }
    if let Some(timing) = page.page_timing {
        if let Some(tti) = timing.time_to_interactive {
            rows.push(row("time_to_interactive_ms", Some(tti), None));
        }
        if let Some(dom) = timing.dom_complete {
            rows.push(row("dom_complete_ms", Some(dom), None));
        }
    }
    for check in PROBLEM_CHECKS {
        if page.checks.get(*check).copied().unwrap_or(false) {
            rows.push(row(check, None, Some("failed".to_string())));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{config_for, jane_doe};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_failed_checks_become_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSTANT_PAGES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{ "status_code": 20000, "result": [{ "items": [{
                    "onpage_score": 87.5,
                    "page_timing": { "time_to_interactive": 1200, "dom_complete": 1500 },
                    "checks": { "no_h1_tag": true, "no_title": false, "is_https": true }
                }]}]}]
            })))
            .mount(&server)
            .await;

        let audit = OnPageAudit::new(DataForSeoClient::from_config(
            &config_for(&server.uri()),
            reqwest::Client::new(),
        ));
        let rows = audit.fetch(&jane_doe()).await;
        let metrics: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();

        assert_eq!(
            metrics,
            vec!["onpage_score", "time_to_interactive_ms", "dom_complete_ms", "no_h1_tag"]
        );
        assert!(rows.iter().all(|r| r.source == AuditSource::OnPage));
    }
}
