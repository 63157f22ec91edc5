use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::company::{CandidateLead, EnrichedCompany};
use super::search::{SearchItem, TaggedSearchItem};

/// Machine-readable form of the free-text ideal-customer-profile, produced
/// by the first pipeline stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredIcp {
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub company_sizes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub equipment_types: Vec<String>,
}

impl StructuredIcp {
    /// Degraded form used when the structuring call fails: the raw profile
    /// text doubles as the only keyword so the run can still search.
    pub fn fallback(icp_text: &str) -> Self {
        StructuredIcp {
            keywords: vec![icp_text.trim().to_string()],
            ..StructuredIcp::default()
        }
    }
}

/// One targeted search for a single missing enrichable field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldQuery {
    pub field: &'static str,
    pub query: String,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub saved: usize,
    pub error: Option<String>,
}

/// The single mutable context threaded through every stage of one run.
/// Constructed once, populated stage by stage, discarded at run end; the
/// save step is the only thing that touches durable storage.
pub struct PipelineState {
    pub icp_text: String,
    pub country: String,
    pub structured_icp: Option<StructuredIcp>,
    pub prior_queries: HashSet<String>,
    pub queries: Vec<String>,
    pub search_results: Vec<SearchItem>,
    pub leads: Vec<CandidateLead>,
    pub companies: Vec<EnrichedCompany>,
    pub refinement_iteration: u32,
    /// Keyed by normalized company name.
    pub refinement_queries: HashMap<String, Vec<FieldQuery>>,
    pub refinement_results: HashMap<String, Vec<TaggedSearchItem>>,
    pub outcome: PipelineOutcome,
}

impl PipelineState {
    pub fn new(icp_text: &str, country: &str) -> Self {
        PipelineState {
            icp_text: icp_text.to_string(),
            country: country.to_lowercase(),
            structured_icp: None,
            prior_queries: HashSet::new(),
            queries: vec![],
            search_results: vec![],
            leads: vec![],
            companies: vec![],
            refinement_iteration: 0,
            refinement_queries: HashMap::new(),
            refinement_results: HashMap::new(),
            outcome: PipelineOutcome::default(),
        }
    }
}

/// The two-state gate between enrichment and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Refine,
    Save,
}

/// Pure transition function for the refinement gate. The iteration bound
/// wins over completeness: past `max_iterations` the batch saves as-is.
/// Otherwise one incomplete company is enough to send the whole batch
/// through another refinement pass.
pub fn next_action(
    iteration: u32,
    max_iterations: u32,
    companies: &[EnrichedCompany],
) -> PipelineAction {
    if iteration > max_iterations {
        return PipelineAction::Save;
    }
    let any_incomplete = companies
        .iter()
        .any(|c| c.enrichment.is_none() || !c.is_complete());
    match any_incomplete {
        true => PipelineAction::Refine,
        false => PipelineAction::Save,
    }
}
