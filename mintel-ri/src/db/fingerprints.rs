//! Signup fingerprints (first client IP seen per user)

use chrono::Utc;
use mintel_common::Result;
use sqlx::SqlitePool;

use super::format_ts;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Number of users other than `user_id` that signed up from `ip_address`
pub async fn other_users_for_ip(pool: &SqlitePool, ip_address: &str, user_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM signup_fingerprints WHERE ip_address = ? AND user_id != ?",
    )
    .bind(ip_address)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Record the user's signup IP. The first fingerprint wins.
pub async fn record_fingerprint(pool: &SqlitePool, user_id: &str, ip_address: &str) -> Result<()> {
    let created_at = format_ts(&Utc::now());

    retry_on_lock("record_fingerprint", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            "INSERT OR IGNORE INTO signup_fingerprints (user_id, ip_address, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(ip_address)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory_pool;

    #[tokio::test]
    async fn test_counts_exclude_requesting_user() {
        let pool = init_in_memory_pool().await.unwrap();
        record_fingerprint(&pool, "user_1", "203.0.113.7").await.unwrap();

        assert_eq!(other_users_for_ip(&pool, "203.0.113.7", "user_1").await.unwrap(), 0);
        assert_eq!(other_users_for_ip(&pool, "203.0.113.7", "user_2").await.unwrap(), 1);
        assert_eq!(other_users_for_ip(&pool, "198.51.100.1", "user_2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_fingerprint_is_kept() {
        let pool = init_in_memory_pool().await.unwrap();
        record_fingerprint(&pool, "user_1", "203.0.113.7").await.unwrap();
        record_fingerprint(&pool, "user_1", "198.51.100.1").await.unwrap();

        let ip: String = sqlx::query_scalar("SELECT ip_address FROM signup_fingerprints WHERE user_id = ?")
            .bind("user_1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(ip, "203.0.113.7");
    }
}
