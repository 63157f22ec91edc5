/// One normalized search hit, whatever backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchItem {
    pub title: String,
    pub description: String,
    pub url: String,
}

impl SearchItem {
    /// Results with neither a title nor a description carry too little
    /// signal to classify and are dropped before triage.
    pub fn is_low_signal(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty()
    }
}

/// A search hit tagged with the provider that supplied it, kept for
/// provenance through the refinement stage.
#[derive(Debug, Clone)]
pub struct TaggedSearchItem {
    pub item: SearchItem,
    pub provider: String,
}
