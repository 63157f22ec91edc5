use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinSet;

use crate::domain::company::EnrichedCompany;
use crate::domain::pipeline_state::FieldQuery;
use crate::domain::search::TaggedSearchItem;

use super::llm_extractor::{parse_llm_json, LlmExtractor};
use super::provider_router::ProviderRouter;

/// Sentinel the field-value model is told to answer when the snippets do
/// not support a value. Never merged into a company.
const NOT_FOUND: &str = "NOT_FOUND";

const FIELD_VALUE_SYSTEM_PROMPT: &str = "You answer one factual question about a company from web search snippets. \
    Reply with the value as a short string. If the snippets do not state it, reply with exactly NOT_FOUND. \
    Never guess.";

/// Only free-text fields can be answered by a single-string lookup.
/// `contacts` (a list of people) and `qualification_scores` (an object)
/// have their own stages and must never receive a bare string.
fn text_lookup_field(field: &str) -> bool {
    field != "contacts" && field != "qualification_scores"
}

/// Search term for one enrichable field, in the language of the target
/// market when we know it. Unknown countries get the English terms.
pub fn localized_field_term(country: &str, field: &str) -> &'static str {
    match (country, field) {
        ("nl", "email") => "e-mailadres",
        ("nl", "phone") => "telefoonnummer",
        ("nl", "location") => "vestigingsadres",
        ("nl", "employee_count") => "aantal medewerkers",
        ("nl", "revenue_estimate") => "omzet",
        ("nl", "equipment_needs") => "machinepark",
        ("nl", "recent_news") => "nieuws",
        ("nl", "entity_type") => "rechtsvorm",
        ("nl", "sub_industry") => "branche",

        ("de", "email") => "E-Mail-Adresse",
        ("de", "phone") => "Telefonnummer",
        ("de", "location") => "Standort",
        ("de", "employee_count") => "Mitarbeiterzahl",
        ("de", "revenue_estimate") => "Umsatz",
        ("de", "equipment_needs") => "Maschinenpark",
        ("de", "recent_news") => "Neuigkeiten",
        ("de", "entity_type") => "Rechtsform",
        ("de", "sub_industry") => "Branche",

        ("fr", "email") => "adresse e-mail",
        ("fr", "phone") => "numéro de téléphone",
        ("fr", "location") => "adresse",
        ("fr", "employee_count") => "effectif",
        ("fr", "revenue_estimate") => "chiffre d'affaires",
        ("fr", "equipment_needs") => "parc matériel",
        ("fr", "recent_news") => "actualités",
        ("fr", "entity_type") => "forme juridique",
        ("fr", "sub_industry") => "secteur d'activité",

        (_, "email") => "email address",
        (_, "phone") => "phone number",
        (_, "location") => "location address",
        (_, "employee_count") => "number of employees",
        (_, "revenue_estimate") => "annual revenue",
        (_, "equipment_needs") => "equipment fleet",
        (_, "recent_news") => "recent news",
        (_, "entity_type") => "legal entity type",
        (_, "sub_industry") => "industry segment",
        _ => "company profile",
    }
}

/// One targeted query per still-missing text field per company, keyed by
/// the company's normalized name. Complete companies contribute nothing,
/// and structured fields are not queryable here.
pub fn generate_refinement_queries(
    companies: &[EnrichedCompany],
    country: &str,
) -> HashMap<String, Vec<FieldQuery>> {
    let mut queries: HashMap<String, Vec<FieldQuery>> = HashMap::new();

    for company in companies {
        let field_queries: Vec<FieldQuery> = company
            .missing_fields()
            .into_iter()
            .filter(|field| text_lookup_field(field))
            .map(|field| FieldQuery {
                field,
                query: format!(
                    r#""{}" {}"#,
                    company.lead.name,
                    localized_field_term(country, field)
                ),
            })
            .collect();
        if field_queries.is_empty() {
            continue;
        }
        queries.insert(company.normalized_name(), field_queries);
    }

    queries
}

/// Run every refinement query, spreading them round-robin across all
/// registered providers so no single provider eats the whole load.
/// Companies run concurrently; a failed query just yields no snippets for
/// that field.
pub async fn run_refinement_search(
    router: Arc<ProviderRouter>,
    queries: &HashMap<String, Vec<FieldQuery>>,
    country: &str,
) -> HashMap<String, Vec<TaggedSearchItem>> {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tasks: JoinSet<(String, Vec<TaggedSearchItem>)> = JoinSet::new();

    for (key, field_queries) in queries {
        let router = router.clone();
        let counter = counter.clone();
        let key = key.clone();
        let field_queries = field_queries.clone();
        let country = country.to_string();

        tasks.spawn(async move {
            let mut tagged: Vec<TaggedSearchItem> = vec![];
            for fq in field_queries {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                match router.search_direct(index, &fq.query, &country).await {
                    Ok((results, provider)) => {
                        tagged.extend(results.into_iter().map(|item| TaggedSearchItem {
                            item,
                            provider: provider.clone(),
                        }));
                    }
                    Err(e) => log::error!("Refinement search failed for '{}': {:?}", fq.query, e),
                }
            }
            (key, tagged)
        });
    }

    let mut results: HashMap<String, Vec<TaggedSearchItem>> = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((key, tagged)) => {
                results.insert(key, tagged);
            }
            Err(e) => log::error!("Refinement search task panicked: {:?}", e),
        }
    }
    results
}

#[derive(Debug, Deserialize)]
struct FieldAnswer {
    #[serde(default)]
    value: Option<String>,
}

fn field_value_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "value": { "type": "string" }
        },
        "required": ["value"],
        "additionalProperties": false
    })
}

/// Ask the model for each still-missing text field against the company's
/// refinement snippets and merge what it finds. Merging is additive: a
/// field filled in the meantime is never touched, the NOT_FOUND sentinel
/// is dropped on the floor, and the structured fields are never asked
/// about, so no bare string can land in them.
pub async fn merge_refinement_results(
    llm: Arc<dyn LlmExtractor>,
    companies: &mut [EnrichedCompany],
    results: &HashMap<String, Vec<TaggedSearchItem>>,
) {
    for company in companies.iter_mut() {
        let tagged = match results.get(&company.normalized_name()) {
            Some(tagged) if !tagged.is_empty() => tagged,
            _ => continue,
        };

        let snippets: String = tagged
            .iter()
            .map(|t| format!("{} - {}\n", t.item.title, t.item.description))
            .collect();

        let lookup_fields: Vec<&'static str> = company
            .missing_fields()
            .into_iter()
            .filter(|field| text_lookup_field(field))
            .collect();
        for field in lookup_fields {
            let user = format!(
                "Company: {}\nQuestion: what is this company's {}?\n\nSearch snippets:\n{}",
                company.lead.name,
                localized_field_term("", field),
                snippets
            );
            let raw = match llm
                .extract(FIELD_VALUE_SYSTEM_PROMPT, &user, "field_value", field_value_schema())
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    log::error!(
                        "Field lookup failed for {} / {}: {:?}",
                        company.lead.name,
                        field,
                        e
                    );
                    continue;
                }
            };
            let answer: FieldAnswer = match parse_llm_json(&raw) {
                Ok(answer) => answer,
                Err(e) => {
                    log::error!(
                        "Unparseable field answer for {} / {}: {}",
                        company.lead.name,
                        field,
                        e
                    );
                    continue;
                }
            };

            let value = match answer.value {
                Some(v) => v.trim().to_string(),
                None => continue,
            };
            if value.is_empty() || value.eq_ignore_ascii_case(NOT_FOUND) {
                continue;
            }
            company.merge_field(field, json!(value));
        }
    }
}
