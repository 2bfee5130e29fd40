//! Contact enrichment adapter (Hunter domain search)

use reqwest::Client;
use serde::Deserialize;

use super::http_executor::{HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;
use crate::models::{Contact, WorkflowContext};

pub const CONTACTS_BASE_URL: &str = "https://api.hunter.io";

pub const MAX_CONTACTS: usize = 10;

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: Option<DomainSearchData>,
}

#[derive(Debug, Deserialize)]
struct DomainSearchData {
    #[serde(default)]
    emails: Vec<EmailEntry>,
}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    value: String,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    /// 0-100
    confidence: Option<f64>,
}

pub struct ContactEnrichment {
    executor: HttpExecutor,
    base_url: String,
    api_key: Option<String>,
}

impl ContactEnrichment {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.contacts;
        Self {
            executor: HttpExecutor::new(client, "contacts", RetryPolicy::from(&config.http))
                .with_rate_limit(vendor.requests_per_second.unwrap_or(0)),
            base_url: vendor.base_url_or(CONTACTS_BASE_URL),
            api_key: vendor.api_key().map(str::to_string),
        }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext) -> Vec<Contact> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Contact enrichment skipped: API key not configured");
            return Vec::new();
        };

        let url = format!("{}/v2/domain-search", self.base_url);
        let domain = ctx.target_domain();
        let limit = MAX_CONTACTS.to_string();

        let response: DomainSearchResponse = match self
            .executor
            .execute_json(|c| {
                c.get(&url).query(&[
                    ("domain", domain.as_str()),
                    ("limit", limit.as_str()),
                    ("api_key", api_key),
                ])
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Contact enrichment failed");
                return Vec::new();
            }
        };

        response
            .data
            .map(|data| data.emails)
            .unwrap_or_default()
            .into_iter()
            .take(MAX_CONTACTS)
            .map(|entry| {
                let name = match (entry.first_name, entry.last_name) {
                    (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                    (first, last) => first.or(last),
                };
                Contact {
                    email: entry.value.to_lowercase(),
                    name,
                    position: entry.position,
                    confidence: entry.confidence.map(|c| (c / 100.0).clamp(0.0, 1.0)),
                }
            })
            .collect()
    }
}
