use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub api_keys: ApiKeySettings,
    pub pipeline: PipelineSettings,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(&self.password)
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}

#[derive(Deserialize, Clone)]
pub struct ApiKeySettings {
    pub openai: String,
    pub serper: String,
    pub brave: String,
    pub searchapi: String,
}

/// Knobs for the discovery pipeline. Defaults in configuration.yaml mirror
/// the throughput limits of the external services, change with care.
#[derive(Deserialize, Clone)]
pub struct PipelineSettings {
    pub openai_model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub llm_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_refinement_iterations: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_search_queries: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub triage_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub enrichment_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub enrichment_batch_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub contact_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub contact_batch_delay_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub contact_query_delay_millis: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_page_words: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_page_chars: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub serper_daily_cap: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub brave_daily_cap: i64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub searchapi_daily_cap: i64,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");

    let settings = config::Config::builder()
        .add_source(config::File::from(base_path.join("configuration.yaml")))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
