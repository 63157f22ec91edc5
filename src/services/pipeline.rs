use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::configuration::PipelineSettings;
use crate::dal::stat_db;
use crate::domain::company::normalize_company_name;
use crate::domain::pipeline_state::{next_action, PipelineAction, PipelineState, StructuredIcp};

use super::contact_enrichment::enrich_contacts_for_companies;
use super::enrichment::enrich_leads;
use super::fetcher::WebsiteFetcher;
use super::llm_extractor::{extract_as, LlmExtractor};
use super::provider_router::ProviderRouter;
use super::refinement::{
    generate_refinement_queries, merge_refinement_results, run_refinement_search,
};
use super::stores::{LeadStore, QueryUsageStore};
use super::triage::triage_search_results;

const ICP_SYSTEM_PROMPT: &str = "You turn a free-text ideal customer profile for an equipment financing company \
    into structured search criteria. Extract only what the profile states or clearly implies.";

const QUERY_SYSTEM_PROMPT: &str = "You write web search queries that surface operating companies matching an ideal \
    customer profile, in the language of the target country where that helps. Queries must target individual \
    companies, not directories or listicles.";

/// One queued discovery run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub icp: String,
    pub country: String,
}

/// Handle the HTTP layer uses to queue runs onto the background handler.
#[derive(Clone)]
pub struct RunRequestSender {
    pub sender: mpsc::UnboundedSender<RunRequest>,
}

impl RunRequestSender {
    pub fn send(&self, request: RunRequest) {
        if let Err(e) = self.sender.send(request) {
            log::error!("Failed to queue pipeline run: {:?}", e);
        }
    }
}

/// Everything one run needs, behind the trait seams so tests can swap the
/// external services out.
pub struct PipelineDeps {
    pub llm: Arc<dyn LlmExtractor>,
    pub router: Arc<ProviderRouter>,
    pub fetcher: Arc<dyn WebsiteFetcher>,
    pub leads: Arc<dyn LeadStore>,
    pub query_usage: Arc<dyn QueryUsageStore>,
    pub settings: PipelineSettings,
}

/// Background loop draining queued runs one at a time. Runs never overlap;
/// the external services are rate-limited enough as it is.
pub async fn pipeline_run_handler(
    mut receiver: mpsc::UnboundedReceiver<RunRequest>,
    deps: PipelineDeps,
    pool: PgPool,
) {
    while let Some(request) = receiver.recv().await {
        log::info!(
            "Starting pipeline run for country {} with ICP: {}",
            request.country,
            request.icp
        );
        let state = run_pipeline(&deps, &request.icp, &request.country).await;
        log::info!(
            "Pipeline run finished: {} companies saved, error: {:?}",
            state.outcome.saved,
            state.outcome.error
        );

        // Bookkeeping only, a failed insert never fails the run.
        if let Err(e) = stat_db::insert_pipeline_run(
            &pool,
            &state.icp_text,
            &state.country,
            state.outcome.saved as i64,
            state.refinement_iteration as i32,
            state.outcome.error.as_deref(),
        )
        .await
        {
            log::error!("Failed to record pipeline run: {:?}", e);
        }
    }
}

/// One full discovery run: ICP structuring, query generation, provider
/// search, triage, enrichment, contacts, bounded refinement, save.
pub async fn run_pipeline(deps: &PipelineDeps, icp: &str, country: &str) -> PipelineState {
    let mut state = PipelineState::new(icp, country);

    structure_icp(deps, &mut state).await;
    load_prior_queries(deps, &mut state).await;
    generate_search_queries(deps, &mut state).await;
    run_searches(deps, &mut state).await;

    state.leads = triage_search_results(
        deps.llm.clone(),
        std::mem::take(&mut state.search_results),
        &state.country,
        deps.settings.triage_concurrency,
    )
    .await;
    dedup_leads_in_run(&mut state);
    log::info!("Triage kept {} candidate leads", state.leads.len());

    state.companies = enrich_leads(
        deps.llm.clone(),
        deps.fetcher.clone(),
        std::mem::take(&mut state.leads),
        &deps.settings,
    )
    .await;

    enrich_contacts_for_companies(
        deps.llm.clone(),
        deps.router.clone(),
        &mut state.companies,
        &state.country,
        &deps.settings,
    )
    .await;

    loop {
        match next_action(
            state.refinement_iteration,
            deps.settings.max_refinement_iterations,
            &state.companies,
        ) {
            PipelineAction::Save => break,
            PipelineAction::Refine => {
                log::info!(
                    "Refinement pass {} of at most {}",
                    state.refinement_iteration + 1,
                    deps.settings.max_refinement_iterations + 1
                );
                state.refinement_queries =
                    generate_refinement_queries(&state.companies, &state.country);
                state.refinement_results = run_refinement_search(
                    deps.router.clone(),
                    &state.refinement_queries,
                    &state.country,
                )
                .await;
                merge_refinement_results(
                    deps.llm.clone(),
                    &mut state.companies,
                    &state.refinement_results,
                )
                .await;
                state.refinement_iteration += 1;
            }
        }
    }

    save_companies(deps, &mut state).await;
    state
}

fn icp_schema() -> serde_json::Value {
    let string_array = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "industries": string_array,
            "company_sizes": string_array,
            "regions": string_array,
            "keywords": string_array,
            "equipment_types": string_array
        },
        "required": ["industries", "company_sizes", "regions", "keywords", "equipment_types"],
        "additionalProperties": false
    })
}

async fn structure_icp(deps: &PipelineDeps, state: &mut PipelineState) {
    let user = format!(
        "Target country: {}\n\nIdeal customer profile:\n{}",
        state.country, state.icp_text
    );
    let structured = match extract_as::<StructuredIcp>(
        deps.llm.as_ref(),
        ICP_SYSTEM_PROMPT,
        &user,
        "icp_profile",
        icp_schema(),
    )
    .await
    {
        Ok(icp) => icp,
        Err(e) => {
            log::error!("ICP structuring failed, falling back: {:?}", e);
            StructuredIcp::fallback(&state.icp_text)
        }
    };
    state.structured_icp = Some(structured);
}

async fn load_prior_queries(deps: &PipelineDeps, state: &mut PipelineState) {
    match deps.query_usage.all_used_queries(&state.country).await {
        Ok(queries) => state.prior_queries = queries.into_iter().collect(),
        // Degraded mode: worst case we re-run some searches.
        Err(e) => log::error!("Could not load prior queries: {:?}", e),
    }
}

#[derive(Debug, Deserialize)]
struct QueryList {
    #[serde(default)]
    queries: Vec<String>,
}

fn query_list_schema(max: usize) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "maxItems": max,
                "items": { "type": "string" }
            }
        },
        "required": ["queries"],
        "additionalProperties": false
    })
}

async fn generate_search_queries(deps: &PipelineDeps, state: &mut PipelineState) {
    let icp = state.structured_icp.clone().unwrap_or_default();
    let user = format!(
        "Target country: {}\nIndustries: {}\nCompany sizes: {}\nRegions: {}\nKeywords: {}\nEquipment: {}\n\n\
         Write up to {} search queries.",
        state.country,
        icp.industries.join(", "),
        icp.company_sizes.join(", "),
        icp.regions.join(", "),
        icp.keywords.join(", "),
        icp.equipment_types.join(", "),
        deps.settings.max_search_queries
    );

    let generated: Vec<String> = match extract_as::<QueryList>(
        deps.llm.as_ref(),
        QUERY_SYSTEM_PROMPT,
        &user,
        "search_queries",
        query_list_schema(deps.settings.max_search_queries),
    )
    .await
    {
        Ok(list) => list.queries,
        Err(e) => {
            log::error!("Query generation failed: {:?}", e);
            vec![]
        }
    };

    // Degraded mode when the model gave us nothing usable.
    let generated = match generated.is_empty() {
        false => generated,
        true => icp
            .keywords
            .iter()
            .chain(icp.industries.iter())
            .map(|term| format!("{} companies {}", term, state.country))
            .collect(),
    };

    let mut seen: HashSet<String> = HashSet::new();
    state.queries = generated
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .filter(|q| !state.prior_queries.contains(q))
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(deps.settings.max_search_queries)
        .collect();
    log::info!("Generated {} fresh search queries", state.queries.len());
}

async fn run_searches(deps: &PipelineDeps, state: &mut PipelineState) {
    let mut seen_urls: HashSet<String> = HashSet::new();

    for query in &state.queries {
        // The generation filter works off a snapshot; re-check right
        // before spending a provider request.
        match deps.query_usage.is_used(query, &state.country).await {
            Ok(true) => {
                log::info!("Skipping already-used query: {}", query);
                continue;
            }
            Ok(false) => {}
            Err(e) => log::error!("Query usage check failed: {:?}", e),
        }

        let (results, tried, winner) = deps
            .router
            .search_with_fallback(query, &state.country)
            .await;

        if let Err(e) = deps
            .query_usage
            .mark_used(query, &state.country, results.len(), &tried, winner.is_some())
            .await
        {
            log::error!("Failed to mark query as used: {:?}", e);
        }

        for item in results {
            if seen_urls.insert(item.url.to_lowercase()) {
                state.search_results.push(item);
            }
        }
    }
    log::info!(
        "Search produced {} unique results across {} queries",
        state.search_results.len(),
        state.queries.len()
    );
}

/// First occurrence wins when triage yields the same company twice in one
/// run, before any money is spent enriching the copy.
fn dedup_leads_in_run(state: &mut PipelineState) {
    let mut seen: HashSet<String> = HashSet::new();
    state
        .leads
        .retain(|lead| seen.insert(normalize_company_name(&lead.name)));
}

async fn save_companies(deps: &PipelineDeps, state: &mut PipelineState) {
    let mut known = match deps.leads.find_all_normalized_names().await {
        Ok(names) => names,
        Err(e) => {
            log::error!("Could not load existing companies, aborting save: {:?}", e);
            state.outcome.error = Some(format!("persistence unavailable: {}", e));
            return;
        }
    };

    for company in &state.companies {
        let key = company.normalized_name();
        if !known.insert(key) {
            log::info!("Skipping duplicate company: {}", company.lead.name);
            continue;
        }

        let id = match deps.leads.create(company).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                log::info!("Store rejected duplicate company: {}", company.lead.name);
                continue;
            }
            Err(e) => {
                log::error!("Failed to save {}: {:?}", company.lead.name, e);
                state.outcome.error = Some(format!("save failed: {}", e));
                return;
            }
        };
        state.outcome.saved += 1;

        if let Some(payload) = &company.enrichment {
            match deps.leads.update_fields(id, payload).await {
                Ok(true) => {}
                Ok(false) => log::error!("Company row {} vanished before enrichment write", id),
                Err(e) => log::error!(
                    "Failed to attach enrichment for {}: {:?}",
                    company.lead.name,
                    e
                ),
            }
        }
    }
}
