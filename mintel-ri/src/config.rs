//! Service configuration for mintel-ri
//!
//! Resolution priority: ENV → TOML → compiled defaults.
//!
//! The configuration is read once at startup and then passed by value/reference into
//! every component that needs it. Adapters never read the process environment, so tests
//! can hand them fake credentials and base URLs directly.

use mintel_common::config::{env_non_empty, load_toml};
use mintel_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5730";

/// Root configuration object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub http: HttpConfig,
    pub auth: AuthConfig,
    pub abuse: AbuseConfig,
    pub vendors: VendorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// SQLite database file. None = `<data dir>/mintel.db`
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// End-to-end wall-clock budget per run. 0 disables the timeout.
    pub run_timeout_secs: u64,
    /// Run independent stages of the same layer concurrently
    pub parallel_stages: bool,
    /// Number of runs processed concurrently
    pub workers: usize,
    /// Pending jobs buffered in memory; further triggers are rejected with 503
    pub queue_capacity: usize,
    /// Maximum keywords queried against the SERP API per run
    pub serp_keyword_cap: usize,
    /// Maximum competitor domains carried through the pipeline
    pub max_competitors: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: 120,
            parallel_stages: false,
            workers: 2,
            queue_capacity: 64,
            serp_keyword_cap: 3,
            max_competitors: 5,
        }
    }
}

impl PipelineConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

/// Outbound HTTP policy shared by every adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Retries after the first attempt when a vendor answers 429
    pub max_retries: u32,
    /// Linear backoff base: wait = backoff_ms * attempt
    pub backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
            request_timeout_secs: 30,
            user_agent: format!("mintel-ri/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Bearer token table: token → user id
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbuseConfig {
    pub enforce_ip_cap: bool,
    /// Distinct users allowed to sign up from one IP address
    pub max_signups_per_ip: u32,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            enforce_ip_cap: true,
            max_signups_per_ip: 1,
        }
    }
}

/// Credentials and endpoint for one vendor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    pub api_key: Option<String>,
    /// Basic-auth login (DataForSEO)
    pub login: Option<String>,
    /// Basic-auth password (DataForSEO)
    pub password: Option<String>,
    /// Override of the vendor's public base URL
    pub base_url: Option<String>,
    /// Model name for LLM vendors
    pub model: Option<String>,
    /// Client-side pacing. None = unpaced
    pub requests_per_second: Option<u32>,
}

impl VendorConfig {
    /// API key if configured and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| is_valid_key(k))
    }

    /// Login/password pair if both configured and non-blank
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.login.as_deref(), self.password.as_deref()) {
            (Some(login), Some(password)) if is_valid_key(login) && is_valid_key(password) => {
                Some((login, password))
            }
            _ => None,
        }
    }

    /// Configured base URL (trailing slash removed) or the vendor default
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model_or(&self, default: &str) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// One entry per external vendor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VendorsConfig {
    /// SERP, keywords, competitors, sentiment, domain analytics, backlinks, on-page
    pub dataforseo: VendorConfig,
    /// Site crawling
    pub firecrawl: VendorConfig,
    /// Google PageSpeed Insights
    pub pagespeed: VendorConfig,
    /// Company enrichment
    pub business: VendorConfig,
    /// News search
    pub news: VendorConfig,
    /// Contact enrichment
    pub contacts: VendorConfig,
    /// Primary LLM (executive summary, competitor fallback)
    pub openai: VendorConfig,
    /// Secondary web-connected LLM (breaking insights)
    pub perplexity: VendorConfig,
}

impl ServiceConfig {
    /// Load configuration from an optional TOML file, then apply ENV overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_toml::<ServiceConfig>(path)?
            }
            None => {
                warn!("No configuration file found, using compiled defaults");
                ServiceConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over TOML values
    pub fn apply_env_overrides(&mut self) {
        if let Some(bind) = env_non_empty("MINTEL_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = env_non_empty("MINTEL_DATABASE") {
            self.server.database_path = Some(PathBuf::from(path));
        }

        let vendors: [(&str, &mut VendorConfig); 8] = [
            ("DATAFORSEO", &mut self.vendors.dataforseo),
            ("FIRECRAWL", &mut self.vendors.firecrawl),
            ("PAGESPEED", &mut self.vendors.pagespeed),
            ("BUSINESS", &mut self.vendors.business),
            ("NEWS", &mut self.vendors.news),
            ("CONTACTS", &mut self.vendors.contacts),
            ("OPENAI", &mut self.vendors.openai),
            ("PERPLEXITY", &mut self.vendors.perplexity),
        ];

        for (name, vendor) in vendors {
            if let Some(key) = env_non_empty(&format!("MINTEL_{}_API_KEY", name)) {
                if vendor.api_key().is_some() {
                    warn!("{} API key found in both TOML and environment, using environment", name);
                }
                vendor.api_key = Some(key);
            }
            if let Some(login) = env_non_empty(&format!("MINTEL_{}_LOGIN", name)) {
                vendor.login = Some(login);
            }
            if let Some(password) = env_non_empty(&format!("MINTEL_{}_PASSWORD", name)) {
                vendor.password = Some(password);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(Error::Config("pipeline.workers must be at least 1".to_string()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(Error::Config("pipeline.queue_capacity must be at least 1".to_string()));
        }
        if self.pipeline.serp_keyword_cap == 0 {
            return Err(Error::Config("pipeline.serp_keyword_cap must be at least 1".to_string()));
        }
        if self.auth.tokens.is_empty() {
            warn!("No bearer tokens configured, every API request will be rejected");
        }
        if self.vendors.openai.api_key().is_none() {
            warn!("Primary LLM API key not configured, every run will fail at synthesis");
        }
        Ok(())
    }

    /// Database file location
    pub fn database_path(&self) -> PathBuf {
        self.server
            .database_path
            .clone()
            .unwrap_or_else(|| mintel_common::config::default_data_dir().join("mintel.db"))
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
