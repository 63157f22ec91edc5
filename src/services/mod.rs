pub mod contact_enrichment;
pub mod enrichment;
pub mod fanout;
pub mod fetcher;
pub mod llm_extractor;
pub mod pipeline;
pub mod provider_router;
pub mod rate_limit;
pub mod refinement;
pub mod search_provider;
pub mod stores;
pub mod triage;

pub use contact_enrichment::*;
pub use enrichment::*;
pub use fanout::*;
pub use fetcher::*;
pub use llm_extractor::*;
pub use pipeline::*;
pub use provider_router::*;
pub use rate_limit::*;
pub use refinement::*;
pub use search_provider::*;
pub use stores::*;
pub use triage::*;

#[cfg(test)]
pub(crate) mod test_support;
