//! Bearer authentication
//!
//! Handlers take an `AuthUser` argument; the extractor resolves the bearer token to a
//! user id through the configured `TokenVerifier` and rejects the request with 401
//! otherwise. Browsers' `EventSource` cannot set headers, so the token is also
//! accepted as an `access_token` query parameter.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::collections::HashMap;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::AppState;

/// Resolves a bearer token to a user id
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<String>;
}

/// Fixed token table from configuration
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.clone())
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = bearer_token(&parts.headers)
            .or_else(|| query_token(parts.uri.query()))
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        match app_state.verifier.verify(&token).await {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                tracing::debug!(path = %parts.uri.path(), "Rejected unknown bearer token");
                Err(ApiError::Unauthorized("Invalid bearer token".to_string()))
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc123")), Some("abc123".to_string()));
        assert_eq!(bearer_token(&headers("bearer  abc123 ")), Some("abc123".to_string()));
        assert_eq!(bearer_token(&headers("Basic abc123")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_query_token_parsing() {
        assert_eq!(query_token(Some("access_token=t%201&x=2")), Some("t 1".to_string()));
        assert_eq!(query_token(Some("access_token=")), None);
        assert_eq!(query_token(None), None);
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticTokenVerifier::new(HashMap::from([(
            "token-jane".to_string(),
            "user_jane".to_string(),
        )]));
        assert_eq!(verifier.verify("token-jane").await.as_deref(), Some("user_jane"));
        assert_eq!(verifier.verify("token-bob").await, None);
    }
}
