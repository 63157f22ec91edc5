use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::configuration::PipelineSettings;
use crate::domain::company::EnrichedCompany;
use crate::domain::contact::{
    dedup_contacts, sanitize_contact, ContactPerson, MAX_CONTACTS_PER_COMPANY,
};

use super::fanout::bounded_map;
use super::llm_extractor::{parse_llm_json, LlmExtractor};
use super::provider_router::ProviderRouter;

/// Companies handed to the contact stage per batch; the external services
/// behind it have the tightest rate limits of the whole pipeline.
const CONTACT_BATCH_SIZE: usize = 10;

const CONTACT_SYSTEM_PROMPT: &str = "You extract named people from web search snippets about a company's leadership. \
    Skip purely generic contact points (an info@ line without a person). When a snippet clearly shows a shared \
    departmental mailbox worth keeping, include it with is_shared_mailbox set to true. Never invent people.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEnrichmentStatus {
    /// At least one usable contact found.
    Completed,
    /// The stage ran but came back empty-handed.
    Partial,
    /// Unrecoverable extraction error.
    Failed,
}

pub struct ContactOutcome {
    pub contacts: Vec<ContactPerson>,
    pub status: ContactEnrichmentStatus,
}

#[derive(Debug, Deserialize)]
struct ContactExtraction {
    #[serde(default)]
    contacts: Vec<ContactPerson>,
}

/// The targeted searches issued per company: leadership-role queries, a
/// professional-network-scoped one, and a site-scoped one when the domain
/// is known.
pub fn contact_queries(company_name: &str, website: Option<&str>) -> Vec<String> {
    let mut queries = vec![
        format!(r#""{}" CEO OR founder OR owner"#, company_name),
        format!(r#""{}" management team contact"#, company_name),
        format!(r#"site:linkedin.com/in "{}""#, company_name),
    ];
    if let Some(domain) = website.and_then(host_of) {
        queries.push(format!("site:{} team OR contact", domain));
    }
    queries
}

fn host_of(url: &str) -> Option<String> {
    let normalized = match url.starts_with("http://") || url.starts_with("https://") {
        true => url.to_string(),
        false => format!("https://{}", url),
    };
    Url::parse(&normalized)
        .ok()?
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_string())
}

fn contact_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "contacts": {
                "type": "array",
                "maxItems": MAX_CONTACTS_PER_COMPANY,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "role": { "type": ["string", "null"] },
                        "email": { "type": ["string", "null"] },
                        "phone": { "type": ["string", "null"] },
                        "linkedin": { "type": ["string", "null"] },
                        "department": { "type": ["string", "null"] },
                        "seniority": { "type": ["string", "null"] },
                        "is_shared_mailbox": { "type": "boolean" }
                    },
                    "required": ["name", "role", "email", "phone", "linkedin",
                                 "department", "seniority", "is_shared_mailbox"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["contacts"],
        "additionalProperties": false
    })
}

/// Find and validate leadership contacts for every company in the batch,
/// merging them into each company's `contacts` field. A company that
/// already carries contacts keeps them untouched.
pub async fn enrich_contacts_for_companies(
    llm: Arc<dyn LlmExtractor>,
    router: Arc<ProviderRouter>,
    companies: &mut [EnrichedCompany],
    country: &str,
    settings: &PipelineSettings,
) {
    let work: Vec<(usize, String, Option<String>)> = companies
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.field_is_filled("contacts"))
        .map(|(i, c)| (i, c.lead.name.clone(), c.resolved_website.clone()))
        .collect();

    let mut first_batch = true;
    for batch in work.chunks(CONTACT_BATCH_SIZE) {
        if !first_batch && settings.contact_batch_delay_secs > 0 {
            tokio::time::sleep(Duration::from_secs(settings.contact_batch_delay_secs)).await;
        }
        first_batch = false;

        let llm = llm.clone();
        let router = router.clone();
        let country = country.to_string();
        let query_delay = Duration::from_millis(settings.contact_query_delay_millis);
        let outcomes = bounded_map(
            batch.to_vec(),
            settings.contact_concurrency,
            move |(index, name, website)| {
                let llm = llm.clone();
                let router = router.clone();
                let country = country.clone();
                async move {
                    let outcome = enrich_company_contacts(
                        llm.as_ref(),
                        router.as_ref(),
                        &name,
                        website.as_deref(),
                        &country,
                        query_delay,
                    )
                    .await;
                    (index, outcome)
                }
            },
        )
        .await;

        for (index, outcome) in outcomes {
            let company = &mut companies[index];
            log::info!(
                "Contact enrichment for {} finished with status {:?} ({} contacts)",
                company.lead.name,
                outcome.status,
                outcome.contacts.len()
            );
            if !outcome.contacts.is_empty() {
                match serde_json::to_value(&outcome.contacts) {
                    Ok(value) => {
                        company.merge_field("contacts", value);
                    }
                    Err(e) => log::error!(
                        "Failed to serialize contacts for {}: {:?}",
                        company.lead.name,
                        e
                    ),
                }
            }
        }
    }
}

pub async fn enrich_company_contacts(
    llm: &dyn LlmExtractor,
    router: &ProviderRouter,
    company_name: &str,
    website: Option<&str>,
    country: &str,
    query_delay: Duration,
) -> ContactOutcome {
    let mut snippets = String::new();
    for query in contact_queries(company_name, website) {
        let (results, _, _) = router.search_with_fallback(&query, country).await;
        for result in results {
            snippets.push_str(&format!("{} - {}\n", result.title, result.description));
        }
        if query_delay > Duration::ZERO {
            tokio::time::sleep(query_delay).await;
        }
    }

    if snippets.trim().is_empty() {
        return ContactOutcome {
            contacts: vec![],
            status: ContactEnrichmentStatus::Partial,
        };
    }

    let user = format!(
        "Company: {}\nWebsite: {}\n\nSearch snippets:\n{}",
        company_name,
        website.unwrap_or("unknown"),
        snippets
    );
    let raw = match llm
        .extract(CONTACT_SYSTEM_PROMPT, &user, "contact_extraction", contact_schema())
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("Contact extraction failed for {}: {:?}", company_name, e);
            return ContactOutcome {
                contacts: vec![],
                status: ContactEnrichmentStatus::Failed,
            };
        }
    };

    let extracted: ContactExtraction = match parse_llm_json(&raw) {
        Ok(extraction) => extraction,
        Err(e) => {
            log::error!("Unparseable contact output for {}: {}", company_name, e);
            return ContactOutcome {
                contacts: vec![],
                status: ContactEnrichmentStatus::Failed,
            };
        }
    };

    let contacts = dedup_contacts(
        extracted
            .contacts
            .into_iter()
            .take(MAX_CONTACTS_PER_COMPANY)
            .filter_map(sanitize_contact)
            .collect(),
    );

    let status = match contacts.is_empty() {
        true => ContactEnrichmentStatus::Partial,
        false => ContactEnrichmentStatus::Completed,
    };
    ContactOutcome { contacts, status }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::company::CandidateLead;
    use crate::domain::search::SearchItem;
    use crate::services::rate_limit::RateLimiter;
    use crate::services::test_support::{test_settings, MockLlm, MockProvider, MockProviderUsage};

    use super::*;

    fn router_with_snippets() -> Arc<ProviderRouter> {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let provider = Arc::new(MockProvider::returning(
            "serper",
            vec![SearchItem {
                title: "Acme Pumps leadership".to_string(),
                description: "Jan de Vries, CEO — jan@acmepumps.nl".to_string(),
                url: "https://acmepumps.nl/team".to_string(),
            }],
        ));
        Arc::new(
            ProviderRouter::new(usage)
                .with_provider(provider, RateLimiter::new(100, Duration::from_secs(1))),
        )
    }

    fn stored_contacts(company: &EnrichedCompany) -> Vec<ContactPerson> {
        company
            .enrichment
            .as_ref()
            .and_then(|payload| payload.get("contacts"))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    fn company(name: &str) -> EnrichedCompany {
        let mut c = EnrichedCompany::new(CandidateLead {
            name: name.to_string(),
            source_url: None,
            country: Some("nl".to_string()),
            industry: None,
            justification: None,
        });
        c.resolved_website = Some("https://www.acmepumps.nl".to_string());
        c
    }

    #[test]
    fn queries_include_site_scope_only_with_a_known_domain() {
        let with_site = contact_queries("Acme Pumps", Some("https://www.acmepumps.nl"));
        assert_eq!(with_site.len(), 4);
        assert!(with_site.iter().any(|q| q == "site:acmepumps.nl team OR contact"));

        let without_site = contact_queries("Acme Pumps", None);
        assert_eq!(without_site.len(), 3);
        assert!(without_site.iter().all(|q| !q.starts_with("site:acmepumps")));
    }

    #[tokio::test]
    async fn invalid_and_duplicate_contacts_are_filtered_out() {
        let llm = MockLlm::new().with(
            "contact_extraction",
            r#"{"contacts": [
                {"name": "Jan de Vries", "role": "CEO", "email": "jan@acmepumps.nl", "phone": null,
                 "linkedin": null, "department": "executive leadership", "seniority": "Chief Executive Officer",
                 "is_shared_mailbox": false},
                {"name": "JAN DE VRIES", "role": "CEO", "email": "JAN@ACMEPUMPS.NL", "phone": null,
                 "linkedin": null, "department": null, "seniority": null, "is_shared_mailbox": false},
                {"name": "Piet Jansen", "role": "advisor", "email": null, "phone": null,
                 "linkedin": null, "department": null, "seniority": null, "is_shared_mailbox": false},
                {"name": "Finance Desk", "role": null, "email": "finance@acmepumps.nl", "phone": null,
                 "linkedin": null, "department": "finance", "seniority": null, "is_shared_mailbox": true}
            ]}"#,
        );
        let router = router_with_snippets();

        let outcome = enrich_company_contacts(
            &llm,
            router.as_ref(),
            "Acme Pumps",
            Some("https://www.acmepumps.nl"),
            "nl",
            Duration::ZERO,
        )
        .await;

        assert_eq!(outcome.status, ContactEnrichmentStatus::Completed);
        // Piet Jansen has neither email nor phone and must be gone; the
        // duplicate Jan collapses to one entry.
        assert_eq!(outcome.contacts.len(), 2);
        assert!(outcome.contacts.iter().all(|c| c.name != "Piet Jansen"));
        let jan = outcome.contacts.iter().find(|c| c.name == "Jan de Vries").unwrap();
        assert_eq!(jan.department.as_deref(), Some("executive"));
        assert_eq!(jan.seniority.as_deref(), Some("c-level"));
    }

    #[tokio::test]
    async fn llm_failure_yields_failed_status_not_a_panic() {
        let llm = MockLlm::new(); // contact_extraction unscripted
        let router = router_with_snippets();

        let outcome = enrich_company_contacts(
            &llm,
            router.as_ref(),
            "Acme Pumps",
            None,
            "nl",
            Duration::ZERO,
        )
        .await;

        assert_eq!(outcome.status, ContactEnrichmentStatus::Failed);
        assert!(outcome.contacts.is_empty());
    }

    #[tokio::test]
    async fn no_snippets_means_partial() {
        let usage = Arc::new(MockProviderUsage::unlimited());
        let empty = Arc::new(MockProvider::returning("serper", vec![]));
        let router = ProviderRouter::new(usage)
            .with_provider(empty, RateLimiter::new(100, Duration::from_secs(1)));
        let llm = MockLlm::new();

        let outcome = enrich_company_contacts(
            &llm,
            &router,
            "Acme Pumps",
            None,
            "nl",
            Duration::ZERO,
        )
        .await;

        assert_eq!(outcome.status, ContactEnrichmentStatus::Partial);
    }

    #[tokio::test]
    async fn merged_contacts_land_in_the_enrichment_payload() {
        let llm = Arc::new(MockLlm::new().with(
            "contact_extraction",
            r#"{"contacts": [
                {"name": "Jan de Vries", "role": "CEO", "email": "jan@acmepumps.nl", "phone": null,
                 "linkedin": null, "department": null, "seniority": null, "is_shared_mailbox": false}
            ]}"#,
        ));
        let router = router_with_snippets();
        let mut companies = vec![company("Acme Pumps")];

        enrich_contacts_for_companies(llm, router, &mut companies, "nl", &test_settings()).await;

        assert!(companies[0].field_is_filled("contacts"));
        let contacts = stored_contacts(&companies[0]);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].email.as_deref(), Some("jan@acmepumps.nl"));
    }

    #[tokio::test]
    async fn companies_with_contacts_already_filled_are_left_alone() {
        let llm = Arc::new(MockLlm::new()); // would fail if consulted
        let router = router_with_snippets();
        let mut filled = company("Acme Pumps");
        filled.merge_field("contacts", json!([{"name": "Existing", "email": "e@acme.nl"}]));
        let mut companies = vec![filled];

        enrich_contacts_for_companies(llm.clone(), router, &mut companies, "nl", &test_settings())
            .await;

        assert_eq!(llm.calls_for("contact_extraction"), 0);
        let payload = companies[0].enrichment.as_ref().unwrap();
        assert_eq!(payload.get("contacts").unwrap()[0]["name"], json!("Existing"));
    }
}
