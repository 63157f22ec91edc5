use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed, ordered set of attributes the pipeline tries to fill for
/// every discovered company. A company is complete iff every one of these
/// holds a truthy value in its enrichment payload.
pub const ENRICHABLE_FIELDS: [&str; 11] = [
    "email",
    "phone",
    "location",
    "employee_count",
    "revenue_estimate",
    "equipment_needs",
    "recent_news",
    "entity_type",
    "sub_industry",
    "contacts",
    "qualification_scores",
];

/// A freshly discovered, unqualified company stub produced by triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLead {
    pub name: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub justification: Option<String>,
}

/// A candidate lead plus whatever the scrape/extract and refinement stages
/// managed to fill in. The payload only ever grows: once a field holds a
/// non-empty value no later stage may blank or replace it.
#[derive(Debug, Clone)]
pub struct EnrichedCompany {
    pub lead: CandidateLead,
    pub resolved_website: Option<String>,
    pub enrichment: Option<Map<String, Value>>,
}

impl EnrichedCompany {
    pub fn new(lead: CandidateLead) -> Self {
        EnrichedCompany {
            lead,
            resolved_website: None,
            enrichment: None,
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_company_name(&self.lead.name)
    }

    pub fn field_is_filled(&self, field: &str) -> bool {
        match &self.enrichment {
            Some(payload) => is_truthy(payload.get(field)),
            None => false,
        }
    }

    /// Enrichable fields still lacking a truthy value, in the fixed order.
    /// A company with no payload at all is missing everything.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        ENRICHABLE_FIELDS
            .iter()
            .filter(|field| !self.field_is_filled(field))
            .copied()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Additive merge: writes `value` only when the field is currently
    /// empty. Returns whether anything was written.
    pub fn merge_field(&mut self, field: &str, value: Value) -> bool {
        if self.field_is_filled(field) || !is_truthy(Some(&value)) {
            return false;
        }
        self.enrichment
            .get_or_insert_with(Map::new)
            .insert(field.to_string(), value);
        true
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    value.is_some_and(value_is_filled)
}

/// What "holds a value" means for an enrichable field.
pub fn value_is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

const LEGAL_SUFFIXES: [&str; 26] = [
    "bv", "nv", "vof", "gmbh", "ag", "ug", "ltd", "llc", "llp", "inc", "plc", "sa", "sas", "sarl",
    "srl", "spa", "oy", "ab", "aps", "kg", "co", "corp", "company", "limited", "holding", "group",
];

/// Canonical dedup key for a company name: lowercase, punctuation out,
/// trailing legal-form tokens stripped, whitespace collapsed.
/// "Acme Health B.V." and "ACME HEALTH bv" land on the same key.
pub fn normalize_company_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    // Dots vanish so "b.v." collapses to "bv" before tokenization.
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c == '.' || c == '\'' {
                '\0'
            } else if c.is_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if LEGAL_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }

    tokens.join(" ")
}
