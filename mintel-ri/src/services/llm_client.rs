//! Chat-completions client for the primary and secondary LLMs
//!
//! Both vendors speak the OpenAI chat-completions dialect. The primary model is asked
//! for a JSON object; the secondary (web-connected) model returns free text.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::http_executor::{HttpError, HttpExecutor, RetryPolicy};
use crate::config::{ServiceConfig, VendorConfig};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const PERPLEXITY_DEFAULT_MODEL: &str = "sonar";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    executor: HttpExecutor,
    provider: &'static str,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    json_mode: bool,
}

impl LlmClient {
    /// Primary LLM (strict JSON output)
    pub fn primary(config: &ServiceConfig, client: Client) -> Self {
        Self::build(
            config,
            client,
            &config.vendors.openai,
            "openai",
            format!("{}/v1/chat/completions", config.vendors.openai.base_url_or(OPENAI_BASE_URL)),
            OPENAI_DEFAULT_MODEL,
            true,
        )
    }

    /// Secondary web-connected LLM (free text)
    pub fn secondary(config: &ServiceConfig, client: Client) -> Self {
        Self::build(
            config,
            client,
            &config.vendors.perplexity,
            "perplexity",
            format!("{}/chat/completions", config.vendors.perplexity.base_url_or(PERPLEXITY_BASE_URL)),
            PERPLEXITY_DEFAULT_MODEL,
            false,
        )
    }

    fn build(
        config: &ServiceConfig,
        client: Client,
        vendor: &VendorConfig,
        provider: &'static str,
        endpoint: String,
        default_model: &str,
        json_mode: bool,
    ) -> Self {
        let executor = HttpExecutor::new(client, provider, RetryPolicy::from(&config.http))
            .with_rate_limit(vendor.requests_per_second.unwrap_or(0));

        Self {
            executor,
            provider,
            endpoint,
            api_key: vendor.api_key().map(str::to_string),
            model: vendor.model_or(default_model),
            json_mode,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send one system + user exchange and return the assistant's text
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, HttpError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(HttpError::MissingCredentials(self.provider))?;

        let mut body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if self.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response: ChatResponse = self
            .executor
            .execute_json(|c| c.post(&self.endpoint).bearer_auth(api_key).json(&body))
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| HttpError::Decode(format!("{} returned no choices", self.provider)))?;

        tracing::debug!(provider = self.provider, model = %self.model, chars = content.len(), "LLM completion received");
        Ok(content)
    }
}
