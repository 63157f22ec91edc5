use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::company::EnrichedCompany;

/// Durable lead storage. The Postgres implementation lives in
/// `dal::company_db`; tests run against an in-memory mock.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_all_normalized_names(&self) -> Result<HashSet<String>>;

    /// Insert a new company row. Returns `None` when a row with the same
    /// normalized name already exists (dedup is the store's last line of
    /// defense, the pipeline checks first).
    async fn create(&self, company: &EnrichedCompany) -> Result<Option<Uuid>>;

    /// Attach enrichment payload fields to an existing row. `false` when
    /// the row no longer exists.
    async fn update_fields(&self, id: Uuid, fields: &Map<String, Value>) -> Result<bool>;
}

/// Tracks which (query, country) pairs have already been executed so
/// identical searches are not re-issued across runs.
#[async_trait]
pub trait QueryUsageStore: Send + Sync {
    async fn is_used(&self, query: &str, country: &str) -> Result<bool>;

    /// Idempotent on repeated marks of the same pair.
    async fn mark_used(
        &self,
        query: &str,
        country: &str,
        result_count: usize,
        providers: &[String],
        success: bool,
    ) -> Result<()>;

    async fn all_used_queries(&self, country: &str) -> Result<Vec<String>>;
}

/// Per-provider daily request accounting. Both operations race across
/// concurrent searches, so implementations must use atomic upserts.
#[async_trait]
pub trait ProviderUsageStore: Send + Sync {
    async fn can_use(&self, provider: &str) -> Result<bool>;
    async fn increment(&self, provider: &str) -> Result<()>;
}
