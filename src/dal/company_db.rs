use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::company::EnrichedCompany;
use crate::services::stores::LeadStore;

pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        PgLeadStore { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn find_all_normalized_names(&self) -> Result<HashSet<String>> {
        let names: Vec<(String,)> = sqlx::query_as("select normalized_name from company")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch company names")?;
        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    async fn create(&self, company: &EnrichedCompany) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            insert into company
                (id, name, normalized_name, country, industry, source_url, website, justification)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict (normalized_name) do nothing
            returning id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&company.lead.name)
        .bind(company.normalized_name())
        .bind(&company.lead.country)
        .bind(&company.lead.industry)
        .bind(&company.lead.source_url)
        .bind(&company.resolved_website)
        .bind(&company.lead.justification)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert company")?;

        Ok(row.map(|(id,)| id))
    }

    async fn update_fields(&self, id: Uuid, fields: &Map<String, Value>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            update company
            set enrichment = coalesce(enrichment, '{}'::jsonb) || $2,
                updated_at = now()
            where id = $1
            "#,
        )
        .bind(id)
        .bind(Value::Object(fields.clone()))
        .execute(&self.pool)
        .await
        .context("Failed to update company enrichment")?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: Uuid,
    pub name: String,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub enrichment: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub async fn recent_companies(pool: &PgPool, limit: i64) -> Result<Vec<CompanyRow>> {
    sqlx::query_as::<_, CompanyRow>(
        r#"
        select id, name, country, industry, website, enrichment, created_at
        from company
        order by created_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch companies")
}
