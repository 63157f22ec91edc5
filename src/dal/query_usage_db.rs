use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::services::stores::QueryUsageStore;

pub struct PgQueryUsageStore {
    pool: PgPool,
}

impl PgQueryUsageStore {
    pub fn new(pool: PgPool) -> Self {
        PgQueryUsageStore { pool }
    }
}

/// Stable dedup key for a (query, country) pair. Case and surrounding
/// whitespace never make a query fresh again.
fn query_hash(query: &str, country: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(country.trim().to_lowercase().as_bytes());
    hasher.update([0x1f]);
    hasher.update(query.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl QueryUsageStore for PgQueryUsageStore {
    async fn is_used(&self, query: &str, country: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "select exists(select 1 from search_query_usage where query_hash = $1)",
        )
        .bind(query_hash(query, country))
        .fetch_one(&self.pool)
        .await
        .context("Failed to check query usage")?;
        Ok(exists)
    }

    async fn mark_used(
        &self,
        query: &str,
        country: &str,
        result_count: usize,
        providers: &[String],
        success: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            insert into search_query_usage
                (query_hash, query, country, result_count, providers, success)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (query_hash) do update
            set result_count = excluded.result_count,
                providers = excluded.providers,
                success = excluded.success,
                used_at = now()
            "#,
        )
        .bind(query_hash(query, country))
        .bind(query)
        .bind(country.to_lowercase())
        .bind(result_count as i32)
        .bind(providers)
        .bind(success)
        .execute(&self.pool)
        .await
        .context("Failed to mark query as used")?;
        Ok(())
    }

    async fn all_used_queries(&self, country: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("select query from search_query_usage where country = $1")
                .bind(country.to_lowercase())
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch used queries")?;
        Ok(rows.into_iter().map(|(q,)| q).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_case_and_whitespace() {
        assert_eq!(
            query_hash("Pompen Verhuur Amsterdam", "NL"),
            query_hash("  pompen verhuur amsterdam ", "nl")
        );
    }

    #[test]
    fn hash_separates_query_and_country() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(query_hash("c", "ab"), query_hash("bc", "a"));
        assert_ne!(query_hash("pumps", "nl"), query_hash("pumps", "de"));
    }
}
