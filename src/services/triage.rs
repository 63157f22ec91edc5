use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::domain::company::CandidateLead;
use crate::domain::search::SearchItem;

use super::fanout::bounded_map;
use super::llm_extractor::{parse_llm_json, LlmExtractor};

const TRIAGE_SYSTEM_PROMPT: &str = "You qualify raw web search results for an equipment financing lead pipeline. \
    Decide whether the result points at an operating company in the target country that could plausibly \
    need equipment financing. News roundups, directories, job boards, marketplaces and informational \
    articles are not companies. Reject when unsure.";

#[derive(Debug, Deserialize)]
struct TriageVerdict {
    #[serde(default)]
    is_company: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    justification: Option<String>,
}

fn triage_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "is_company": { "type": "boolean" },
            "name": { "type": ["string", "null"] },
            "country": { "type": ["string", "null"] },
            "industry": { "type": ["string", "null"] },
            "justification": { "type": ["string", "null"] }
        },
        "required": ["is_company", "name", "country", "industry", "justification"],
        "additionalProperties": false
    })
}

/// Classify raw search results into candidate leads. Rejections (model
/// says no, parse failure, missing name) are logged and swallowed; the
/// output order follows completion order.
pub async fn triage_search_results(
    llm: Arc<dyn LlmExtractor>,
    results: Vec<SearchItem>,
    country: &str,
    concurrency: usize,
) -> Vec<CandidateLead> {
    let country = country.to_string();
    let leads = bounded_map(results, concurrency, move |item| {
        let llm = llm.clone();
        let country = country.clone();
        async move { triage_one(llm.as_ref(), &item, &country).await }
    })
    .await;

    leads.into_iter().flatten().collect()
}

async fn triage_one(
    llm: &dyn LlmExtractor,
    item: &SearchItem,
    country: &str,
) -> Option<CandidateLead> {
    if item.is_low_signal() {
        return None;
    }

    let user = format!(
        "Title: {}\nDescription: {}\nUrl: {}\nTarget country: {}",
        item.title, item.description, item.url, country
    );

    let raw = match llm
        .extract(TRIAGE_SYSTEM_PROMPT, &user, "lead_triage", triage_schema())
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("Triage call failed for {}: {:?}", item.url, e);
            return None;
        }
    };

    let verdict: TriageVerdict = match parse_llm_json(&raw) {
        Ok(verdict) => verdict,
        Err(e) => {
            log::error!("Unparseable triage verdict for {}: {}", item.url, e);
            return None;
        }
    };

    if !verdict.is_company {
        return None;
    }
    let name = verdict.name?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    Some(CandidateLead {
        name,
        source_url: Some(item.url.clone()),
        country: verdict.country.or_else(|| Some(country.to_string())),
        industry: verdict.industry,
        justification: verdict.justification,
    })
}
