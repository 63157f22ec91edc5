// In-memory stand-ins for the external seams, shared by the service tests.
// No network, no database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::configuration::PipelineSettings;
use crate::domain::company::{normalize_company_name, EnrichedCompany};
use crate::domain::search::SearchItem;

use super::fetcher::{FetchedPage, WebsiteFetcher};
use super::llm_extractor::LlmExtractor;
use super::search_provider::SearchProvider;
use super::stores::{LeadStore, ProviderUsageStore, QueryUsageStore};

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        openai_model: "gpt-4o-mini".to_string(),
        llm_timeout_secs: 5,
        max_refinement_iterations: 3,
        max_search_queries: 8,
        triage_concurrency: 4,
        enrichment_concurrency: 5,
        enrichment_batch_size: 50,
        contact_concurrency: 2,
        contact_batch_delay_secs: 0,
        contact_query_delay_millis: 0,
        min_page_words: 5,
        max_page_chars: 8000,
        serper_daily_cap: 100,
        brave_daily_cap: 100,
        searchapi_daily_cap: 100,
    }
}

// ---------------------------------------------------------------------------
// Search provider
// ---------------------------------------------------------------------------

pub struct MockProvider {
    name: &'static str,
    results: Vec<SearchItem>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn returning(name: &'static str, results: Vec<SearchItem>) -> Self {
        MockProvider {
            name,
            results,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        MockProvider {
            name,
            results: vec![],
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn search(&self, _query: &str, _country: &str) -> Result<Vec<SearchItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("simulated provider outage"));
        }
        Ok(self.results.clone())
    }
}

// ---------------------------------------------------------------------------
// Provider usage store
// ---------------------------------------------------------------------------

pub struct MockProviderUsage {
    counts: Mutex<HashMap<String, i64>>,
    capped: HashSet<String>,
}

impl MockProviderUsage {
    pub fn unlimited() -> Self {
        MockProviderUsage {
            counts: Mutex::new(HashMap::new()),
            capped: HashSet::new(),
        }
    }

    pub fn capped(providers: &[&str]) -> Self {
        MockProviderUsage {
            counts: Mutex::new(HashMap::new()),
            capped: providers.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn count(&self, provider: &str) -> i64 {
        *self.counts.lock().unwrap().get(provider).unwrap_or(&0)
    }
}

#[async_trait]
impl ProviderUsageStore for MockProviderUsage {
    async fn can_use(&self, provider: &str) -> Result<bool> {
        Ok(!self.capped.contains(provider))
    }

    async fn increment(&self, provider: &str) -> Result<()> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query usage store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockQueryUsage {
    used: Mutex<HashSet<(String, String)>>,
    pub marks: Mutex<Vec<(String, usize, bool)>>,
}

impl MockQueryUsage {
    pub fn with_used(pairs: &[(&str, &str)]) -> Self {
        MockQueryUsage {
            used: Mutex::new(
                pairs
                    .iter()
                    .map(|(q, c)| (q.to_string(), c.to_string()))
                    .collect(),
            ),
            marks: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl QueryUsageStore for MockQueryUsage {
    async fn is_used(&self, query: &str, country: &str) -> Result<bool> {
        Ok(self
            .used
            .lock()
            .unwrap()
            .contains(&(query.to_string(), country.to_string())))
    }

    async fn mark_used(
        &self,
        query: &str,
        country: &str,
        result_count: usize,
        _providers: &[String],
        success: bool,
    ) -> Result<()> {
        self.used
            .lock()
            .unwrap()
            .insert((query.to_string(), country.to_string()));
        self.marks
            .lock()
            .unwrap()
            .push((query.to_string(), result_count, success));
        Ok(())
    }

    async fn all_used_queries(&self, country: &str) -> Result<Vec<String>> {
        Ok(self
            .used
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c == country)
            .map(|(q, _)| q.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Scripted extractor: one canned raw response per schema name. Schemas
/// with no script entry produce an error, like a real outage would.
pub struct MockLlm {
    responses: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        MockLlm {
            responses: HashMap::new(),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn with(mut self, schema_name: &str, raw: &str) -> Self {
        self.responses.insert(schema_name.to_string(), raw.to_string());
        self
    }

    pub fn calls_for(&self, schema_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == schema_name)
            .count()
    }
}

#[async_trait]
impl LlmExtractor for MockLlm {
    async fn extract(
        &self,
        _system: &str,
        _user: &str,
        schema_name: &str,
        _schema: Value,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(schema_name.to_string());
        self.responses
            .get(schema_name)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted response for schema '{}'", schema_name))
    }
}

// ---------------------------------------------------------------------------
// Website fetcher
// ---------------------------------------------------------------------------

pub struct MockFetcher {
    pages: HashMap<String, String>,
}

impl MockFetcher {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        MockFetcher {
            pages: pages
                .iter()
                .map(|(url, text)| (url.to_string(), text.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl WebsiteFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchedPage {
        match self.pages.get(url) {
            Some(text) => FetchedPage {
                success: true,
                text: text.clone(),
            },
            None => FetchedPage {
                success: false,
                text: String::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Lead store
// ---------------------------------------------------------------------------

pub struct MockLeadStore {
    names: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<Uuid>>,
    fail: bool,
}

impl MockLeadStore {
    pub fn empty() -> Self {
        MockLeadStore {
            names: Mutex::new(HashSet::new()),
            created: Mutex::new(vec![]),
            updated: Mutex::new(vec![]),
            fail: false,
        }
    }

    pub fn seeded(names: &[&str]) -> Self {
        MockLeadStore {
            names: Mutex::new(names.iter().map(|n| normalize_company_name(n)).collect()),
            created: Mutex::new(vec![]),
            updated: Mutex::new(vec![]),
            fail: false,
        }
    }

    pub fn unreachable() -> Self {
        MockLeadStore {
            names: Mutex::new(HashSet::new()),
            created: Mutex::new(vec![]),
            updated: Mutex::new(vec![]),
            fail: true,
        }
    }
}

#[async_trait]
impl LeadStore for MockLeadStore {
    async fn find_all_normalized_names(&self) -> Result<HashSet<String>> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.names.lock().unwrap().clone())
    }

    async fn create(&self, company: &EnrichedCompany) -> Result<Option<Uuid>> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        let key = company.normalized_name();
        let mut names = self.names.lock().unwrap();
        if !names.insert(key) {
            return Ok(None);
        }
        self.created.lock().unwrap().push(company.lead.name.clone());
        Ok(Some(Uuid::new_v4()))
    }

    async fn update_fields(&self, id: Uuid, _fields: &Map<String, Value>) -> Result<bool> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        self.updated.lock().unwrap().push(id);
        Ok(true)
    }
}
