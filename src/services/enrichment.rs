use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use strsim::jaro_winkler;
use url::Url;

use crate::configuration::PipelineSettings;
use crate::domain::company::{value_is_filled, CandidateLead, EnrichedCompany};

use super::fanout::bounded_map;
use super::fetcher::WebsiteFetcher;
use super::llm_extractor::{parse_llm_json, LlmExtractor};

const GUESS_TLDS: [&str; 5] = ["com", "nl", "de", "fr", "io"];

/// Hosts that are never a company's own website, whatever triage handed us.
const NON_COMPANY_HOSTS: [&str; 14] = [
    "linkedin.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "wikipedia.org",
    "crunchbase.com",
    "glassdoor.com",
    "indeed.com",
    "medium.com",
    "google.com",
    "yelp.com",
    "kvk.nl",
];

const PROFILE_SYSTEM_PROMPT: &str = "You extract structured company attributes from website text for an equipment \
    financing lead pipeline. Only report what the text supports; use null for anything the page does not state.";

/// Scrape-and-extract for a batch of candidate leads. Fixed-size batches
/// bound task creation; within a batch the semaphore bounds concurrent
/// fetches and results land as they complete. One failing lead degrades to
/// a company with a null payload, nothing more.
pub async fn enrich_leads(
    llm: Arc<dyn LlmExtractor>,
    fetcher: Arc<dyn WebsiteFetcher>,
    leads: Vec<CandidateLead>,
    settings: &PipelineSettings,
) -> Vec<EnrichedCompany> {
    let mut companies: Vec<EnrichedCompany> = Vec::with_capacity(leads.len());

    for batch in leads.chunks(settings.enrichment_batch_size.max(1)) {
        let min_words = settings.min_page_words;
        let max_chars = settings.max_page_chars;
        let llm = llm.clone();
        let fetcher = fetcher.clone();
        let enriched = bounded_map(
            batch.to_vec(),
            settings.enrichment_concurrency,
            move |lead| {
                let llm = llm.clone();
                let fetcher = fetcher.clone();
                async move { enrich_one(llm.as_ref(), fetcher.as_ref(), lead, min_words, max_chars).await }
            },
        )
        .await;
        companies.extend(enriched);
    }

    companies
}

async fn enrich_one(
    llm: &dyn LlmExtractor,
    fetcher: &dyn WebsiteFetcher,
    lead: CandidateLead,
    min_words: usize,
    max_chars: usize,
) -> EnrichedCompany {
    let urls = candidate_urls(&lead);
    let mut company = EnrichedCompany::new(lead);

    for url in urls {
        let page = fetcher.fetch(&url).await;
        if !page.success {
            continue;
        }
        if page.text.split_whitespace().count() < min_words {
            log::info!("Page at {} too thin to extract from, trying next", url);
            continue;
        }

        // First substantial page wins; an extraction failure afterwards
        // leaves the payload null rather than trying further URLs.
        company.resolved_website = Some(url.clone());
        let text: String = page.text.chars().take(max_chars).collect();
        match extract_company_profile(llm, &company.lead, &text).await {
            Ok(payload) => company.enrichment = Some(payload),
            Err(e) => log::error!(
                "Profile extraction failed for {} at {}: {:?}",
                company.lead.name,
                url,
                e
            ),
        }
        break;
    }

    if company.resolved_website.is_none() {
        log::info!("No usable website found for {}", company.lead.name);
    }
    company
}

/// Ordered URLs to try for a lead: its source URL first and, unless that
/// already looks like the company's own domain, name-based guesses across
/// a handful of TLDs.
pub fn candidate_urls(lead: &CandidateLead) -> Vec<String> {
    let mut urls: Vec<String> = vec![];

    if let Some(source) = &lead.source_url {
        if !source.trim().is_empty() {
            urls.push(source.clone());
            if looks_like_company_domain(source, &lead.name) {
                return urls;
            }
        }
    }

    let slug = name_slug(&lead.name);
    if !slug.is_empty() {
        for tld in GUESS_TLDS {
            urls.push(format!("https://www.{}.{}", slug, tld));
        }
    }

    urls
}

fn name_slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn looks_like_company_domain(url: &str, company_name: &str) -> bool {
    let normalized = match url.starts_with("http://") || url.starts_with("https://") {
        true => url.to_string(),
        false => format!("https://{}", url),
    };
    let host = match Url::parse(&normalized).ok().and_then(|u| u.host_str().map(|h| h.to_string())) {
        Some(host) => host.to_lowercase(),
        None => return false,
    };
    if NON_COMPANY_HOSTS.iter().any(|blocked| host.ends_with(blocked)) {
        return false;
    }

    let stem = host
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or("")
        .replace('-', "");
    if stem.is_empty() {
        return false;
    }
    jaro_winkler(&stem, &name_slug(company_name)) >= 0.8
}

fn profile_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "email": { "type": ["string", "null"] },
            "phone": { "type": ["string", "null"] },
            "location": { "type": ["string", "null"] },
            "employee_count": { "type": ["string", "null"] },
            "revenue_estimate": { "type": ["string", "null"] },
            "equipment_needs": { "type": ["string", "null"] },
            "recent_news": { "type": ["string", "null"] },
            "entity_type": { "type": ["string", "null"] },
            "sub_industry": { "type": ["string", "null"] },
            "qualification_scores": {
                "type": ["object", "null"],
                "properties": {
                    "financing_fit": { "type": "number" },
                    "urgency": { "type": "number" },
                    "size_fit": { "type": "number" }
                },
                "required": ["financing_fit", "urgency", "size_fit"],
                "additionalProperties": false
            }
        },
        "required": ["email", "phone", "location", "employee_count", "revenue_estimate",
                     "equipment_needs", "recent_news", "entity_type", "sub_industry",
                     "qualification_scores"],
        "additionalProperties": false
    })
}

async fn extract_company_profile(
    llm: &dyn LlmExtractor,
    lead: &CandidateLead,
    page_text: &str,
) -> Result<Map<String, Value>> {
    let user = format!(
        "Company: {}\nIndustry: {}\nCountry: {}\n\nWebsite text:\n{}",
        lead.name,
        lead.industry.as_deref().unwrap_or("unknown"),
        lead.country.as_deref().unwrap_or("unknown"),
        page_text
    );

    let raw = llm
        .extract(PROFILE_SYSTEM_PROMPT, &user, "company_profile", profile_schema())
        .await?;
    let payload: Map<String, Value> = parse_llm_json(&raw)?;

    // Nulls and empties out, so missing-field tracking stays honest.
    Ok(payload
        .into_iter()
        .filter(|(_, value)| value_is_filled(value))
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::services::test_support::{test_settings, MockFetcher, MockLlm};

    use super::*;

    fn lead(name: &str, source_url: Option<&str>) -> CandidateLead {
        CandidateLead {
            name: name.to_string(),
            source_url: source_url.map(|u| u.to_string()),
            country: Some("nl".to_string()),
            industry: Some("construction".to_string()),
            justification: None,
        }
    }

    const PROFILE_JSON: &str = r#"{
        "email": "finance@acmepumps.nl", "phone": "+31201234567", "location": "Amsterdam",
        "employee_count": "50-100", "revenue_estimate": null, "equipment_needs": "pumps",
        "recent_news": null, "entity_type": "BV", "sub_industry": "pump rental",
        "qualification_scores": {"financing_fit": 8, "urgency": 5, "size_fit": 7}
    }"#;

    #[test]
    fn a_matching_source_domain_is_the_only_candidate() {
        let urls = candidate_urls(&lead("Acme Pumps", Some("https://www.acmepumps.nl/about")));
        assert_eq!(urls, vec!["https://www.acmepumps.nl/about".to_string()]);
    }

    #[test]
    fn an_aggregator_source_gets_name_based_guesses_appended() {
        let urls = candidate_urls(&lead(
            "Acme Pumps",
            Some("https://www.linkedin.com/company/acme-pumps"),
        ));
        assert_eq!(urls[0], "https://www.linkedin.com/company/acme-pumps");
        assert!(urls.contains(&"https://www.acmepumps.com".to_string()));
        assert!(urls.contains(&"https://www.acmepumps.nl".to_string()));
        assert_eq!(urls.len(), 1 + GUESS_TLDS.len());
    }

    #[test]
    fn a_lead_without_source_url_still_gets_guesses() {
        let urls = candidate_urls(&lead("Acme Pumps", None));
        assert_eq!(urls.len(), GUESS_TLDS.len());
        assert!(urls[0].starts_with("https://www.acmepumps."));
    }

    #[tokio::test]
    async fn thin_pages_are_skipped_in_favor_of_the_next_candidate() {
        let llm = Arc::new(MockLlm::new().with("company_profile", PROFILE_JSON));
        let fetcher = Arc::new(MockFetcher::new(&[
            ("https://www.linkedin.com/company/acme-pumps", "too thin"),
            (
                "https://www.acmepumps.com",
                "Acme Pumps rents and services industrial pumps across the Benelux region since 1982.",
            ),
        ]));

        let companies = enrich_leads(
            llm,
            fetcher,
            vec![lead("Acme Pumps", Some("https://www.linkedin.com/company/acme-pumps"))],
            &test_settings(),
        )
        .await;

        assert_eq!(companies.len(), 1);
        assert_eq!(
            companies[0].resolved_website.as_deref(),
            Some("https://www.acmepumps.com")
        );
        let payload = companies[0].enrichment.as_ref().unwrap();
        assert_eq!(payload.get("location"), Some(&serde_json::json!("Amsterdam")));
        // Nulls from the model never enter the payload.
        assert!(!payload.contains_key("revenue_estimate"));
    }

    #[tokio::test]
    async fn one_failing_lead_does_not_abort_the_batch() {
        let llm = Arc::new(MockLlm::new().with("company_profile", PROFILE_JSON));
        let fetcher = Arc::new(MockFetcher::new(&[(
            "https://www.acmepumps.com",
            "Acme Pumps rents and services industrial pumps across the Benelux region since 1982.",
        )]));

        let companies = enrich_leads(
            llm,
            fetcher,
            vec![lead("Acme Pumps", None), lead("Ghost Company", None)],
            &test_settings(),
        )
        .await;

        assert_eq!(companies.len(), 2);
        let ghost = companies
            .iter()
            .find(|c| c.lead.name == "Ghost Company")
            .unwrap();
        assert!(ghost.enrichment.is_none());
        assert!(ghost.resolved_website.is_none());
        let acme = companies.iter().find(|c| c.lead.name == "Acme Pumps").unwrap();
        assert!(acme.enrichment.is_some());
    }

    #[tokio::test]
    async fn extraction_failure_leaves_a_null_payload_but_keeps_the_website() {
        let llm = Arc::new(MockLlm::new()); // no scripted profile -> extraction errors
        let fetcher = Arc::new(MockFetcher::new(&[(
            "https://www.acmepumps.com",
            "Acme Pumps rents and services industrial pumps across the Benelux region since 1982.",
        )]));

        let companies = enrich_leads(llm, fetcher, vec![lead("Acme Pumps", None)], &test_settings()).await;

        assert_eq!(companies.len(), 1);
        assert!(companies[0].enrichment.is_none());
        assert_eq!(
            companies[0].resolved_website.as_deref(),
            Some("https://www.acmepumps.com")
        );
    }
}
