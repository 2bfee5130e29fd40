//! Competitor discovery
//!
//! Sources in priority order:
//! 1. Domains the user entered at onboarding
//! 2. DataForSEO domain-level competitors
//! 3. Free-text suggestion from the primary LLM
//!
//! Later sources only fill remaining slots. The target's own domain is excluded by
//! exact comparison after normalization.

use serde::Deserialize;
use serde_json::json;

use super::dataforseo_client::DataForSeoClient;
use super::llm_client::LlmClient;
use crate::models::{CompetitorDomain, CompetitorOrigin, WorkflowContext};
use crate::utils::{normalize_domain, same_domain};

const COMPETITORS_DOMAIN_PATH: &str = "/v3/dataforseo_labs/google/competitors_domain/live";

#[derive(Debug, Deserialize)]
struct CompetitorItem {
    domain: String,
}

pub struct CompetitorDiscovery {
    dataforseo: DataForSeoClient,
    llm: LlmClient,
    max_competitors: usize,
}

/// Ordered, de-duplicated competitor list that never contains the target
struct CompetitorSet {
    target: String,
    max: usize,
    domains: Vec<CompetitorDomain>,
}

impl CompetitorSet {
    fn new(target: String, max: usize) -> Self {
        Self {
            target,
            max,
            domains: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.domains.len() >= self.max
    }

    fn offer(&mut self, candidate: &str, origin: CompetitorOrigin) {
        if self.is_full() {
            return;
        }
        let Some(domain) = normalize_domain(candidate) else {
            return;
        };
        if same_domain(&domain, &self.target) || self.domains.iter().any(|d| d.domain == domain) {
            return;
        }
        self.domains.push(CompetitorDomain { domain, origin });
    }
}

impl CompetitorDiscovery {
    pub fn new(dataforseo: DataForSeoClient, llm: LlmClient, max_competitors: usize) -> Self {
        Self {
            dataforseo,
            llm,
            max_competitors,
        }
    }

    pub async fn discover(&self, ctx: &WorkflowContext) -> Vec<CompetitorDomain> {
        let mut set = CompetitorSet::new(ctx.target_domain(), self.max_competitors);

        for domain in &ctx.competitors {
            set.offer(domain, CompetitorOrigin::User);
        }

        if !set.is_full() {
            for domain in self.from_api(ctx).await {
                set.offer(&domain, CompetitorOrigin::Api);
            }
        }

        if !set.is_full() {
            for domain in self.from_llm(ctx).await {
                set.offer(&domain, CompetitorOrigin::Llm);
            }
        }

        tracing::info!(
            workflow_id = %ctx.workflow_id,
            competitors = set.domains.len(),
            "Competitor discovery complete"
        );
        set.domains
    }

    async fn from_api(&self, ctx: &WorkflowContext) -> Vec<String> {
        if !self.dataforseo.has_credentials() {
            tracing::warn!(workflow_id = %ctx.workflow_id, "Competitor API skipped: DataForSEO credentials not configured");
            return Vec::new();
        }

        let task = json!({
            "target": ctx.target_domain(),
            "location_name": ctx.location,
            "language_code": "en",
            "limit": self.max_competitors * 2,
        });

        match self
            .dataforseo
            .post_items::<CompetitorItem>(COMPETITORS_DOMAIN_PATH, task)
            .await
        {
            Ok(items) => items.into_iter().map(|item| item.domain).collect(),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "Competitor API failed");
                Vec::new()
            }
        }
    }

    async fn from_llm(&self, ctx: &WorkflowContext) -> Vec<String> {
        if !self.llm.has_credentials() {
            return Vec::new();
        }

        let system = "You are a market analyst. Answer with a JSON object only.";
        let prompt = format!(
            "List up to {} direct competitor website domains for {} ({} industry, {}). \
             Respond as {{\"competitors\": [\"domain.com\", ...]}} with bare domains only.",
            self.max_competitors,
            ctx.target_domain(),
            ctx.industry,
            ctx.location
        );

        match self.llm.complete(system, &prompt).await {
            Ok(text) => parse_domains(&text),
            Err(e) => {
                tracing::warn!(workflow_id = %ctx.workflow_id, error = %e, "LLM competitor suggestion failed");
                Vec::new()
            }
        }
    }
}

/// Pull plausible domains out of free text, in order of appearance
pub fn parse_domains(text: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    let separators = |c: char| c.is_whitespace() || matches!(c, ',' | ';' | '[' | ']' | '{' | '}' | '(' | ')' | '"' | '\'' | '`' | '*');

    for token in text.split(separators) {
        let token = token.trim_matches(|c: char| matches!(c, '.' | ':' | '-' | '•'));
        // "competitors:" keys and list numbering fall out here
        if let Some(domain) = normalize_domain(token) {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
    }

    domains
}
