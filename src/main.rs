use std::{net::TcpListener, sync::Arc, time::Duration};

use env_logger::Env;
use magnet::{
    configuration::get_configuration,
    dal::{
        company_db::PgLeadStore, provider_usage_db::PgProviderUsageStore,
        query_usage_db::PgQueryUsageStore,
    },
    services::{
        pipeline_run_handler, BraveProvider, OpenaiExtractor, PipelineDeps, ProviderRouter,
        RateLimiter, ReqwestFetcher, RunRequest, RunRequestSender, SearchApiProvider,
        SerperProvider,
    },
    startup::run,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let pool_options = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(15 * 60)) // 15 minutes
        .max_lifetime(None);
    let connection_pool = pool_options.connect_lazy_with(configuration.database.with_db());

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    let pipeline = configuration.pipeline.clone();
    let llm = Arc::new(OpenaiExtractor::new(
        configuration.api_keys.openai,
        pipeline.openai_model.clone(),
        pipeline.llm_timeout_secs,
    ));

    // Providers in priority order; each gets its own one-a-second limiter.
    let provider_usage = Arc::new(PgProviderUsageStore::new(
        connection_pool.clone(),
        &pipeline,
    ));
    let router = Arc::new(
        ProviderRouter::new(provider_usage)
            .with_provider(
                Arc::new(SerperProvider::new(configuration.api_keys.serper)),
                RateLimiter::new(1, Duration::from_secs(1)),
            )
            .with_provider(
                Arc::new(BraveProvider::new(configuration.api_keys.brave)),
                RateLimiter::new(1, Duration::from_secs(1)),
            )
            .with_provider(
                Arc::new(SearchApiProvider::new(configuration.api_keys.searchapi)),
                RateLimiter::new(1, Duration::from_secs(1)),
            ),
    );

    let deps = PipelineDeps {
        llm,
        router,
        fetcher: Arc::new(ReqwestFetcher::new()),
        leads: Arc::new(PgLeadStore::new(connection_pool.clone())),
        query_usage: Arc::new(PgQueryUsageStore::new(connection_pool.clone())),
        settings: pipeline,
    };

    let (run_sender, run_receiver) = mpsc::unbounded_channel::<RunRequest>();
    let run_sender = RunRequestSender { sender: run_sender };

    let pool_clone = connection_pool.clone();
    tokio::spawn(async move { pipeline_run_handler(run_receiver, deps, pool_clone).await });

    run(listener, connection_pool, run_sender)?.await
}
