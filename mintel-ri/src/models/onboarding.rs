//! Onboarding intake and the per-run workflow context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::domain::{normalize_domain, normalize_website_url};

/// Keywords or competitors accepted from the intake form
const MAX_USER_LIST_LEN: usize = 20;

/// POST /api/onboarding request body
///
/// Every field is optional at the serde level so that missing fields produce a 400
/// with the list of missing names rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub full_name: Option<String>,
    pub website_url: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub target_keywords: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
}

impl OnboardingRequest {
    /// Validate the four required fields and build the profile for `user_id`
    pub fn into_profile(self, user_id: &str) -> mintel_common::Result<OnboardingProfile> {
        let required = [
            ("fullName", &self.full_name),
            ("websiteUrl", &self.website_url),
            ("industry", &self.industry),
            ("location", &self.location),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(mintel_common::Error::InvalidInput(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let raw_url = self.website_url.unwrap_or_default();
        let website_url = normalize_website_url(&raw_url).ok_or_else(|| {
            mintel_common::Error::InvalidInput(format!("websiteUrl is not a valid website: {}", raw_url))
        })?;

        let target_keywords = clean_list(self.target_keywords, |k| {
            let k = k.trim().to_lowercase();
            (!k.is_empty()).then_some(k)
        });
        let competitors = clean_list(self.competitors, |c| normalize_domain(&c));

        Ok(OnboardingProfile {
            user_id: user_id.to_string(),
            full_name: self.full_name.unwrap_or_default().trim().to_string(),
            website_url,
            industry: self.industry.unwrap_or_default().trim().to_string(),
            location: self.location.unwrap_or_default().trim().to_string(),
            target_keywords,
            competitors,
            updated_at: Utc::now(),
        })
    }
}

fn clean_list<F>(items: Vec<String>, normalize: F) -> Vec<String>
where
    F: Fn(String) -> Option<String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items.into_iter().filter_map(normalize) {
        if !out.contains(&item) {
            out.push(item);
        }
        if out.len() == MAX_USER_LIST_LEN {
            break;
        }
    }
    out
}

/// Latest intake values per user (upserted on every trigger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub user_id: String,
    pub full_name: String,
    pub website_url: String,
    pub industry: String,
    pub location: String,
    pub target_keywords: Vec<String>,
    pub competitors: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Input handed to every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: Uuid,
    pub user_id: String,
    pub full_name: String,
    pub website_url: String,
    pub industry: String,
    pub location: String,
    pub target_keywords: Vec<String>,
    pub competitors: Vec<String>,
}

impl WorkflowContext {
    pub fn from_profile(workflow_id: Uuid, profile: &OnboardingProfile) -> Self {
        Self {
            workflow_id,
            user_id: profile.user_id.clone(),
            full_name: profile.full_name.clone(),
            website_url: profile.website_url.clone(),
            industry: profile.industry.clone(),
            location: profile.location.clone(),
            target_keywords: profile.target_keywords.clone(),
            competitors: profile.competitors.clone(),
        }
    }

    /// Normalized domain of the onboarded website
    pub fn target_domain(&self) -> String {
        normalize_domain(&self.website_url).unwrap_or_else(|| self.website_url.clone())
    }
}
