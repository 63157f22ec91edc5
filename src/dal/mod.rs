pub mod company_db;
pub mod provider_usage_db;
pub mod query_usage_db;
pub mod stat_db;
