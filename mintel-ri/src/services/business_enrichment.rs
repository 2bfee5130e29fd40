//! Company enrichment adapter
//!
//! Firmographics and technology categories for the target and its competitors, looked
//! up concurrently. Domains the vendor does not know are skipped.

use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;

use super::http_executor::{HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;
use crate::models::{BusinessProfile, CompetitorDomain, WorkflowContext};

pub const BUSINESS_BASE_URL: &str = "https://company.clearbit.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyResponse {
    name: Option<String>,
    #[serde(default)]
    category: Option<CompanyCategory>,
    #[serde(default)]
    metrics: Option<CompanyMetrics>,
    #[serde(default)]
    geo: Option<CompanyGeo>,
    #[serde(default)]
    tech_categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompanyCategory {
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompanyMetrics {
    employees: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompanyGeo {
    city: Option<String>,
    country: Option<String>,
}

pub struct BusinessEnrichment {
    executor: HttpExecutor,
    base_url: String,
    api_key: Option<String>,
}

impl BusinessEnrichment {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.business;
        Self {
            executor: HttpExecutor::new(client, "business", RetryPolicy::from(&config.http))
                .with_rate_limit(vendor.requests_per_second.unwrap_or(0)),
            base_url: vendor.base_url_or(BUSINESS_BASE_URL),
            api_key: vendor.api_key().map(str::to_string),
        }
    }

    pub async fn fetch(&self, ctx: &WorkflowContext, competitors: &[CompetitorDomain]) -> Vec<BusinessProfile> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Business enrichment skipped: API key not configured");
            return Vec::new();
        };

        let url = format!("{}/v2/companies/find", self.base_url);
        let domains: Vec<String> = std::iter::once(ctx.target_domain())
            .chain(competitors.iter().map(|c| c.domain.clone()))
            .collect();

        let lookups = domains.iter().map(|domain| {
            let url = &url;
            async move {
                let outcome = self
                    .executor
                    .execute_json::<CompanyResponse, _>(|c| {
                        c.get(url).bearer_auth(api_key).query(&[("domain", domain.as_str())])
                    })
                    .await;
                (domain, outcome)
            }
        });

        let mut rows = Vec::new();
        for (domain, outcome) in join_all(lookups).await {
            match outcome {
                Ok(company) => rows.push(profile_from(domain, company)),
                Err(e) => {
                    tracing::warn!(workflow_id = %ctx.workflow_id, domain = %domain, error = %e, "Company lookup failed");
                }
            }
        }

        rows
    }
}

fn profile_from(domain: &str, company: CompanyResponse) -> BusinessProfile {
    let location = company.geo.and_then(|geo| match (geo.city, geo.country) {
        (Some(city), Some(country)) => Some(format!("{}, {}", city, country)),
        (city, country) => city.or(country),
    });

    let mut tech_categories = company.tech_categories;
    tech_categories.sort();
    tech_categories.dedup();

    BusinessProfile {
        domain: domain.to_string(),
        name: company.name,
        industry: company.category.and_then(|c| c.industry),
        employees: company.metrics.and_then(|m| m.employees),
        location,
        tech_categories,
    }
}
