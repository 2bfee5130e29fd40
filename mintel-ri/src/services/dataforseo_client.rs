//! DataForSEO API client
//!
//! Shared by the SERP, keyword, competitor, sentiment, domain analytics, backlink and
//! on-page adapters. Every endpoint is a "live" task: POST an array of task objects,
//! read `tasks[].result[]` back.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::http_executor::{HttpError, HttpExecutor, RetryPolicy};
use crate::config::ServiceConfig;

pub const DATAFORSEO_BASE_URL: &str = "https://api.dataforseo.com";

/// Task status code for success
const TASK_OK: u32 = 20000;

#[derive(Debug, Deserialize)]
struct TaskEnvelope<T> {
    #[serde(default = "Vec::new")]
    tasks: Vec<Task<T>>,
}

#[derive(Debug, Deserialize)]
struct Task<T> {
    status_code: u32,
    #[serde(default)]
    status_message: String,
    result: Option<Vec<T>>,
}

/// Result wrapper used by the `dataforseo_labs`, backlinks and on-page endpoints
#[derive(Debug, Deserialize)]
pub struct ItemsResult<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Clone)]
pub struct DataForSeoClient {
    executor: HttpExecutor,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl DataForSeoClient {
    pub fn from_config(config: &ServiceConfig, client: Client) -> Self {
        let vendor = &config.vendors.dataforseo;
        let executor = HttpExecutor::new(client, "dataforseo", RetryPolicy::from(&config.http))
            .with_rate_limit(vendor.requests_per_second.unwrap_or(0));

        Self {
            executor,
            base_url: vendor.base_url_or(DATAFORSEO_BASE_URL),
            credentials: vendor
                .basic_auth()
                .map(|(login, password)| (login.to_string(), password.to_string())),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// POST one task to `path` and return the flattened results of successful tasks
    pub async fn post_task<T: DeserializeOwned>(&self, path: &str, task: Value) -> Result<Vec<T>, HttpError> {
        let (login, password) = self
            .credentials
            .as_ref()
            .ok_or(HttpError::MissingCredentials("dataforseo"))?;

        let url = format!("{}{}", self.base_url, path);
        let body = Value::Array(vec![task]);

        let envelope: TaskEnvelope<T> = self
            .executor
            .execute_json(|c| c.post(&url).basic_auth(login, Some(password)).json(&body))
            .await?;

        let mut results = Vec::new();
        for task in envelope.tasks {
            if task.status_code != TASK_OK {
                tracing::warn!(
                    path,
                    status_code = task.status_code,
                    message = %task.status_message,
                    "DataForSEO task failed"
                );
                continue;
            }
            results.extend(task.result.unwrap_or_default());
        }

        Ok(results)
    }

    /// `post_task` for endpoints whose results carry an `items` list
    pub async fn post_items<T: DeserializeOwned>(&self, path: &str, task: Value) -> Result<Vec<T>, HttpError> {
        let results: Vec<ItemsResult<T>> = self.post_task(path, task).await?;
        Ok(results.into_iter().flat_map(|r| r.items).collect())
    }
}
