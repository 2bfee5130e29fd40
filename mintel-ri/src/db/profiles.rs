//! Onboarding profile persistence (one row per user, upserted on every trigger)

use mintel_common::Result;
use sqlx::{Row, SqlitePool};

use super::{format_ts, parse_ts};
use crate::models::OnboardingProfile;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

pub async fn upsert_profile(pool: &SqlitePool, profile: &OnboardingProfile) -> Result<()> {
    let target_keywords = serde_json::to_string(&profile.target_keywords)?;
    let competitors = serde_json::to_string(&profile.competitors)?;
    let updated_at = format_ts(&profile.updated_at);

    retry_on_lock("upsert_profile", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO onboarding_profiles (
                user_id, full_name, website_url, industry, location,
                target_keywords, competitors, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                full_name = excluded.full_name,
                website_url = excluded.website_url,
                industry = excluded.industry,
                location = excluded.location,
                target_keywords = excluded.target_keywords,
                competitors = excluded.competitors,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.full_name)
        .bind(&profile.website_url)
        .bind(&profile.industry)
        .bind(&profile.location)
        .bind(&target_keywords)
        .bind(&competitors)
        .bind(&updated_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

pub async fn load_profile(pool: &SqlitePool, user_id: &str) -> Result<Option<OnboardingProfile>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, full_name, website_url, industry, location,
               target_keywords, competitors, updated_at
        FROM onboarding_profiles
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let target_keywords: String = row.get("target_keywords");
    let competitors: String = row.get("competitors");
    let updated_at: String = row.get("updated_at");

    Ok(Some(OnboardingProfile {
        user_id: row.get("user_id"),
        full_name: row.get("full_name"),
        website_url: row.get("website_url"),
        industry: row.get("industry"),
        location: row.get("location"),
        target_keywords: serde_json::from_str(&target_keywords)?,
        competitors: serde_json::from_str(&competitors)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
    }))
}
