use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::search::SearchItem;

/// Uniform interface over the web-search backends. Each implementation has
/// its own auth scheme and payload shape; all of them return the same
/// normalized item list. Failures surface as `Err` or an empty list, never
/// as partially-populated entries.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str, country: &str) -> Result<Vec<SearchItem>>;
}

// ---------------------------------------------------------------------------
// Serper (google.serper.dev), POST with api key header
// ---------------------------------------------------------------------------

pub struct SerperProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

#[derive(Serialize)]
struct SerperBody<'a> {
    q: &'a str,
    gl: &'a str,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperHit>,
}

#[derive(Deserialize)]
struct SerperHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl SerperProvider {
    pub fn new(api_key: String) -> Self {
        SerperProvider {
            client: reqwest::Client::new(),
            api_key,
            url: "https://google.serper.dev/search".to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    fn name(&self) -> &'static str {
        "serper"
    }

    async fn search(&self, query: &str, country: &str) -> Result<Vec<SearchItem>> {
        let response = self
            .client
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperBody { q: query, gl: country })
            .send()
            .await?
            .error_for_status()?
            .json::<SerperResponse>()
            .await?;

        Ok(response
            .organic
            .into_iter()
            .filter(|hit| !hit.link.is_empty())
            .map(|hit| SearchItem {
                title: hit.title,
                description: hit.snippet,
                url: hit.link,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Brave (api.search.brave.com), GET with subscription token header
// ---------------------------------------------------------------------------

pub struct BraveProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveHit>,
}

#[derive(Deserialize)]
struct BraveHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

impl BraveProvider {
    pub fn new(api_key: String) -> Self {
        BraveProvider {
            client: reqwest::Client::new(),
            api_key,
            url: "https://api.search.brave.com/res/v1/web/search".to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, query: &str, country: &str) -> Result<Vec<SearchItem>> {
        let response = self
            .client
            .get(&self.url)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("country", country)])
            .send()
            .await?
            .error_for_status()?
            .json::<BraveResponse>()
            .await?;

        Ok(response
            .web
            .unwrap_or_default()
            .results
            .into_iter()
            .filter(|hit| !hit.url.is_empty())
            .map(|hit| SearchItem {
                title: hit.title,
                description: hit.description,
                url: hit.url,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SearchApi (searchapi.io), GET with bearer token
// ---------------------------------------------------------------------------

pub struct SearchApiProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

#[derive(Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    organic_results: Vec<SearchApiHit>,
}

#[derive(Deserialize)]
struct SearchApiHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

impl SearchApiProvider {
    pub fn new(api_key: String) -> Self {
        SearchApiProvider {
            client: reqwest::Client::new(),
            api_key,
            url: "https://www.searchapi.io/api/v1/search".to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for SearchApiProvider {
    fn name(&self) -> &'static str {
        "searchapi"
    }

    async fn search(&self, query: &str, country: &str) -> Result<Vec<SearchItem>> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .query(&[("engine", "google"), ("q", query), ("gl", country)])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchApiResponse>()
            .await?;

        Ok(response
            .organic_results
            .into_iter()
            .filter(|hit| !hit.link.is_empty())
            .map(|hit| SearchItem {
                title: hit.title,
                description: hit.snippet,
                url: hit.link,
            })
            .collect())
    }
}
