//! Shared fixtures for adapter tests

use uuid::Uuid;

use crate::config::{ServiceConfig, VendorConfig};
use crate::models::WorkflowContext;

/// Every vendor pointed at `base_url` with fake credentials and no retry delay
pub fn config_for(base_url: &str) -> ServiceConfig {
    let vendor = VendorConfig {
        api_key: Some("test-key".to_string()),
        login: Some("login".to_string()),
        password: Some("password".to_string()),
        base_url: Some(base_url.to_string()),
        ..Default::default()
    };

    let mut config = ServiceConfig::default();
    config.http.backoff_ms = 1;
    config.vendors.dataforseo = vendor.clone();
    config.vendors.firecrawl = vendor.clone();
    config.vendors.pagespeed = vendor.clone();
    config.vendors.business = vendor.clone();
    config.vendors.news = vendor.clone();
    config.vendors.contacts = vendor.clone();
    config.vendors.openai = vendor.clone();
    config.vendors.perplexity = vendor;
    config
}

pub fn jane_doe() -> WorkflowContext {
    WorkflowContext {
        workflow_id: Uuid::new_v4(),
        user_id: "user_jane".to_string(),
        full_name: "Jane Doe".to_string(),
        website_url: "https://example.com".to_string(),
        industry: "SaaS".to_string(),
        location: "United States".to_string(),
        target_keywords: Vec::new(),
        competitors: Vec::new(),
    }
}
