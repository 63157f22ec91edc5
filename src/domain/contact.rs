use std::sync::OnceLock;

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Hard cap asked of the extraction model per company.
pub const MAX_CONTACTS_PER_COMPANY: usize = 10;

const DEPARTMENTS: [&str; 9] = [
    "executive",
    "finance",
    "operations",
    "sales",
    "marketing",
    "engineering",
    "procurement",
    "hr",
    "it",
];

const SENIORITIES: [&str; 6] = ["owner", "c-level", "vp", "director", "manager", "specialist"];

const GENERIC_LOCAL_PARTS: [&str; 9] = [
    "info", "sales", "contact", "support", "admin", "office", "hello", "mail", "team",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPerson {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    /// Marks a deliberate shared mailbox (e.g. finance@) the model was told
    /// to flag; only these may keep a generic local part.
    #[serde(default)]
    pub is_shared_mailbox: bool,
}

/// Validate and canonicalize one extracted contact. A contact without a
/// name, or with neither a usable email nor a usable phone after cleaning,
/// is commercially useless and dropped.
pub fn sanitize_contact(mut contact: ContactPerson) -> Option<ContactPerson> {
    if contact.name.trim().is_empty() {
        return None;
    }
    contact.name = contact.name.trim().to_string();
    contact.email = contact
        .email
        .as_deref()
        .and_then(|e| clean_email(e, contact.is_shared_mailbox));
    contact.phone = contact.phone.as_deref().and_then(clean_phone);

    if contact.email.is_none() && contact.phone.is_none() {
        return None;
    }

    contact.department = contact.department.as_deref().and_then(normalize_department);
    contact.seniority = contact.seniority.as_deref().and_then(normalize_seniority);

    Some(contact)
}

/// Dedup by lowercased (name, email); first occurrence wins.
pub fn dedup_contacts(contacts: Vec<ContactPerson>) -> Vec<ContactPerson> {
    contacts
        .into_iter()
        .unique_by(|c| {
            (
                c.name.to_lowercase(),
                c.email.as_deref().unwrap_or("").to_lowercase(),
            )
        })
        .collect()
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._%+-]*@[a-z0-9][a-z0-9.-]*\.[a-z]{2,}$").unwrap()
    })
}

pub fn clean_email(raw: &str, is_shared_mailbox: bool) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if !email_regex().is_match(&email) {
        return None;
    }
    let local = email.split('@').next().unwrap_or("");
    if !is_shared_mailbox && GENERIC_LOCAL_PARTS.contains(&local) {
        return None;
    }
    Some(email)
}

/// Strip formatting, keep a leading +, and require a plausible digit count.
pub fn clean_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 7 || digits.len() > 15 {
        return None;
    }
    match trimmed.starts_with('+') {
        true => Some(format!("+{}", digits)),
        false => Some(digits),
    }
}

pub fn normalize_department(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    DEPARTMENTS
        .iter()
        .find(|dept| lowered.contains(*dept) || dept.contains(lowered.as_str()))
        .map(|dept| dept.to_string())
}

pub fn normalize_seniority(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    // Chief-level titles rarely spell out "c-level" themselves.
    let c_level_markers = ["chief", "ceo", "cfo", "coo", "cto", "c-level", "c level"];
    if c_level_markers.iter().any(|m| lowered.contains(m)) {
        return Some("c-level".to_string());
    }
    if lowered.contains("founder") || lowered.contains("owner") {
        return Some("owner".to_string());
    }
    if lowered.contains("vice president") || lowered.contains("vp") {
        return Some("vp".to_string());
    }
    SENIORITIES
        .iter()
        .find(|s| lowered.contains(*s) || s.contains(lowered.as_str()))
        .map(|s| s.to_string())
}
