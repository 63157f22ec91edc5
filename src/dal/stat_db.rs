use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert_pipeline_run(
    pool: &PgPool,
    icp: &str,
    country: &str,
    companies_saved: i64,
    refinement_iterations: i32,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into pipeline_run (id, icp, country, companies_saved, refinement_iterations, error)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(icp)
    .bind(country)
    .bind(companies_saved)
    .bind(refinement_iterations)
    .bind(error)
    .execute(pool)
    .await
    .context("Failed to insert pipeline run")?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub icp: String,
    pub country: String,
    pub companies_saved: i64,
    pub refinement_iterations: i32,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

pub async fn recent_runs(pool: &PgPool, limit: i64) -> Result<Vec<PipelineRunRow>> {
    sqlx::query_as::<_, PipelineRunRow>(
        r#"
        select icp, country, companies_saved, refinement_iterations, error, finished_at
        from pipeline_run
        order by finished_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch pipeline runs")
}

pub async fn company_count(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("select count(*) from company")
        .fetch_one(pool)
        .await
        .context("Failed to count companies")?;
    Ok(count)
}

pub async fn contact_count(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        select coalesce(sum(jsonb_array_length(enrichment->'contacts')), 0)::bigint
        from company
        where jsonb_typeof(enrichment->'contacts') = 'array'
        "#,
    )
    .fetch_one(pool)
    .await
    .context("Failed to count contacts")?;
    Ok(count)
}
