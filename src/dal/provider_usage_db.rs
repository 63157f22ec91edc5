use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::configuration::PipelineSettings;
use crate::services::stores::ProviderUsageStore;

/// Daily request accounting per search provider, keyed on (provider, day).
/// The increment is a single atomic upsert so concurrent searches never
/// lose a count.
pub struct PgProviderUsageStore {
    pool: PgPool,
    daily_caps: HashMap<String, i64>,
}

impl PgProviderUsageStore {
    pub fn new(pool: PgPool, settings: &PipelineSettings) -> Self {
        let daily_caps = HashMap::from([
            ("serper".to_string(), settings.serper_daily_cap),
            ("brave".to_string(), settings.brave_daily_cap),
            ("searchapi".to_string(), settings.searchapi_daily_cap),
        ]);
        PgProviderUsageStore { pool, daily_caps }
    }
}

#[async_trait]
impl ProviderUsageStore for PgProviderUsageStore {
    async fn can_use(&self, provider: &str) -> Result<bool> {
        let cap = match self.daily_caps.get(provider) {
            Some(cap) => *cap,
            None => return Ok(true),
        };
        let count: Option<(i64,)> = sqlx::query_as(
            "select request_count from provider_usage where provider = $1 and day = current_date",
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read provider usage")?;

        Ok(count.map(|(c,)| c).unwrap_or(0) < cap)
    }

    async fn increment(&self, provider: &str) -> Result<()> {
        sqlx::query(
            r#"
            insert into provider_usage (provider, day, request_count)
            values ($1, current_date, 1)
            on conflict (provider, day) do update
            set request_count = provider_usage.request_count + 1
            "#,
        )
        .bind(provider)
        .execute(&self.pool)
        .await
        .context("Failed to increment provider usage")?;
        Ok(())
    }
}
