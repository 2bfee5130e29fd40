//! Retry-wrapped HTTP executor
//!
//! Every vendor adapter sends its requests through an `HttpExecutor`. A 429 response
//! is retried after `backoff * attempt` while retries remain; any other non-2xx status
//! fails immediately with the status attached. Transport errors are not retried.
//!
//! Each executor may carry a client-side pacing limiter (requests per second) so the
//! service stays under vendor quotas.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::HttpConfig;

/// Longest error body kept on a `Status` error
const MAX_ERROR_BODY: usize = 512;

type VendorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Executor errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Exceeded retries after {attempts} attempts")]
    ExceededRetries { attempts: u32 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Missing credentials for {0}")]
    MissingCredentials(&'static str),
}

/// Retry budget
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base backoff; attempt N waits `backoff * N`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Build the shared reqwest client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, HttpError> {
    let mut builder = Client::builder().user_agent(config.user_agent.clone());
    if config.request_timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
    }
    builder.build().map_err(|e| HttpError::Network(e.to_string()))
}

/// HTTP executor for one vendor
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    vendor: &'static str,
    policy: RetryPolicy,
    limiter: Option<Arc<VendorLimiter>>,
}

impl HttpExecutor {
    pub fn new(client: Client, vendor: &'static str, policy: RetryPolicy) -> Self {
        Self {
            client,
            vendor,
            policy,
            limiter: None,
        }
    }

    /// Pace requests to at most `requests_per_second` (0 disables pacing)
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        self
    }

    pub fn vendor(&self) -> &'static str {
        self.vendor
    }

    /// Send the request produced by `build`, retrying on 429
    ///
    /// `build` is called once per attempt since a `RequestBuilder` is consumed by `send`.
    pub async fn execute<F>(&self, build: F) -> Result<Response, HttpError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let response = build(&self.client)
                .send()
                .await
                .map_err(|e| HttpError::Network(e.to_string()))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.policy.max_retries {
                    tracing::warn!(vendor = self.vendor, attempts = attempt, "Rate limited, retries exhausted");
                    return Err(HttpError::ExceededRetries { attempts: attempt });
                }

                let wait = self.policy.backoff * attempt;
                tracing::debug!(vendor = self.vendor, attempt, wait_ms = wait.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let mut body = response.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                return Err(HttpError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }
    }

    /// `execute` and decode the JSON body into `T`
    pub async fn execute_json<T, F>(&self, build: F) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.execute(build).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::Network(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(max_retries: u32) -> HttpExecutor {
        HttpExecutor::new(
            Client::new(),
            "test",
            RetryPolicy {
                max_retries,
                backoff: Duration::from_millis(5),
            },
        )
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map(|r| r.len()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_retries_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let url = format!("{}/data", server.uri());
        let value: serde_json::Value = executor(2).execute_json(|c| c.get(&url)).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_persistent_429_exceeds_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let url = format!("{}/data", server.uri());
        let err = executor(2).execute(|c| c.get(&url)).await.unwrap_err();

        assert!(matches!(err, HttpError::ExceededRetries { attempts: 3 }));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let url = format!("{}/data", server.uri());
        let err = executor(2).execute(|c| c.post(&url)).await.unwrap_err();

        match err {
            HttpError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let url = format!("{}/data", server.uri());
        let result: Result<serde_json::Value, _> = executor(0).execute_json(|c| c.get(&url)).await;
        assert!(matches!(result, Err(HttpError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let err = executor(2)
            .execute(|c| c.get("http://127.0.0.1:9/unreachable"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Network(_)));
    }

    #[test]
    fn test_policy_from_config() {
        let config = HttpConfig::default();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff, Duration::from_millis(500));
    }
}
