use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::domain::search::SearchItem;

use super::rate_limit::RateLimiter;
use super::search_provider::SearchProvider;
use super::stores::ProviderUsageStore;

struct RoutedProvider {
    provider: Arc<dyn SearchProvider>,
    limiter: RateLimiter,
}

/// Tries search providers in registration (priority) order until one of
/// them returns at least one result. Providers at their daily cap are
/// skipped; empty results and errors of any kind advance the chain the
/// same way. Usage only increments for the provider that actually
/// delivered.
pub struct ProviderRouter {
    providers: Vec<RoutedProvider>,
    usage: Arc<dyn ProviderUsageStore>,
}

impl ProviderRouter {
    pub fn new(usage: Arc<dyn ProviderUsageStore>) -> Self {
        ProviderRouter {
            providers: vec![],
            usage,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>, limiter: RateLimiter) -> Self {
        self.providers.push(RoutedProvider { provider, limiter });
        self
    }

    /// Returns the results, the names of the providers actually invoked,
    /// and the name of the provider that supplied the results (`None` when
    /// the whole chain came up empty, which is degraded yield, not an error).
    pub async fn search_with_fallback(
        &self,
        query: &str,
        country: &str,
    ) -> (Vec<SearchItem>, Vec<String>, Option<String>) {
        let mut tried: Vec<String> = vec![];

        for routed in &self.providers {
            let name = routed.provider.name();

            match self.usage.can_use(name).await {
                Ok(true) => {}
                Ok(false) => {
                    log::info!("Provider {} is at its daily cap, skipping", name);
                    continue;
                }
                Err(e) => {
                    log::error!("Usage check for provider {} failed: {:?}", name, e);
                    continue;
                }
            }

            tried.push(name.to_string());
            routed.limiter.acquire().await;

            match routed.provider.search(query, country).await {
                Ok(results) if !results.is_empty() => {
                    if let Err(e) = self.usage.increment(name).await {
                        log::error!("Failed to record usage for provider {}: {:?}", name, e);
                    }
                    return (results, tried, Some(name.to_string()));
                }
                Ok(_) => log::info!("Provider {} returned no results for: {}", name, query),
                Err(e) => log::error!("Provider {} failed on '{}': {:?}", name, query, e),
            }
        }

        log::error!("All search providers exhausted for query: {}", query);
        (vec![], tried, None)
    }

    /// Direct search against one provider picked by index (round-robin
    /// assignment happens at the caller). Still queues at the provider's
    /// rate limiter; no fallback, no usage cap check.
    pub async fn search_direct(
        &self,
        index: usize,
        query: &str,
        country: &str,
    ) -> Result<(Vec<SearchItem>, String)> {
        if self.providers.is_empty() {
            return Err(anyhow!("no search providers registered"));
        }
        let routed = &self.providers[index % self.providers.len()];
        routed.limiter.acquire().await;
        let results = routed.provider.search(query, country).await?;
        Ok((results, routed.provider.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::services::test_support::{MockProvider, MockProviderUsage};

    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(100, Duration::from_secs(1))
    }

    fn item(url: &str) -> SearchItem {
        SearchItem {
            title: format!("title {}", url),
            description: "desc".to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn falls_back_past_an_empty_provider_and_counts_only_the_winner() {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let empty = Arc::new(MockProvider::returning("alpha", vec![]));
        let full = Arc::new(MockProvider::returning(
            "beta",
            vec![item("a"), item("b"), item("c")],
        ));

        let router = ProviderRouter::new(usage.clone())
            .with_provider(empty.clone(), limiter())
            .with_provider(full.clone(), limiter());

        let (results, tried, winner) = router.search_with_fallback("pumps", "nl").await;

        assert_eq!(results.len(), 3);
        assert_eq!(winner.as_deref(), Some("beta"));
        assert_eq!(tried, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(usage.count("alpha"), 0);
        assert_eq!(usage.count("beta"), 1);
    }

    #[tokio::test]
    async fn a_failing_provider_is_treated_like_an_empty_one() {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let broken = Arc::new(MockProvider::failing("alpha"));
        let full = Arc::new(MockProvider::returning("beta", vec![item("a")]));

        let router = ProviderRouter::new(usage.clone())
            .with_provider(broken, limiter())
            .with_provider(full, limiter());

        let (results, _, winner) = router.search_with_fallback("pumps", "nl").await;

        assert_eq!(results.len(), 1);
        assert_eq!(winner.as_deref(), Some("beta"));
        assert_eq!(usage.count("alpha"), 0);
    }

    #[tokio::test]
    async fn a_capped_provider_is_never_invoked() {
        let usage = Arc::new(MockProviderUsage::capped(&["alpha"]));
        let capped = Arc::new(MockProvider::returning("alpha", vec![item("a")]));
        let full = Arc::new(MockProvider::returning("beta", vec![item("b")]));

        let router = ProviderRouter::new(usage.clone())
            .with_provider(capped.clone(), limiter())
            .with_provider(full, limiter());

        let (results, tried, winner) = router.search_with_fallback("pumps", "nl").await;

        assert_eq!(capped.calls(), 0);
        assert_eq!(results[0].url, "b");
        assert_eq!(winner.as_deref(), Some("beta"));
        assert_eq!(tried, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn full_exhaustion_is_empty_not_an_error() {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let router = ProviderRouter::new(usage)
            .with_provider(Arc::new(MockProvider::returning("alpha", vec![])), limiter())
            .with_provider(Arc::new(MockProvider::failing("beta")), limiter());

        let (results, tried, winner) = router.search_with_fallback("pumps", "nl").await;

        assert!(results.is_empty());
        assert!(winner.is_none());
        assert_eq!(tried.len(), 2);
    }

    #[tokio::test]
    async fn direct_search_wraps_around_the_provider_list() {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let alpha = Arc::new(MockProvider::returning("alpha", vec![item("a")]));
        let beta = Arc::new(MockProvider::returning("beta", vec![item("b")]));
        let router = ProviderRouter::new(usage)
            .with_provider(alpha.clone(), limiter())
            .with_provider(beta.clone(), limiter());

        for index in 0..4 {
            router.search_direct(index, "q", "nl").await.unwrap();
        }
        assert_eq!(alpha.calls(), 2);
        assert_eq!(beta.calls(), 2);
    }
}
