//! Keyword tables: the service catalog and the reply keyword sets

use serde::Deserialize;
use std::path::Path;

use super::normalize::{find_phrase, first_word, normalize, words};

/// Replies that count as "yes"
pub const AFFIRMATIVE: &[&str] = &["yes", "y", "yeah", "yep", "agree", "ok", "okay", "sure"];
/// Replies that count as "no". Matched against the whole message so
/// "no problem" is not a refusal.
pub const NEGATIVE: &[&str] = &["no", "n", "nope", "disagree", "no thanks", "no thank you"];
pub const RESTART: &[&str] = &["restart", "reset", "start over"];
pub const HELP: &[&str] = &["help", "menu", "options"];
pub const REGISTER: &[&str] = &["register", "become provider", "become a provider", "join"];
/// Matched against the whole message
pub const CANCEL: &[&str] = &["cancel", "cancel booking", "cancel it", "stop"];
pub const PROVIDER_ACCEPT: &[&str] = &["accept", "approve"];
pub const PROVIDER_DENY: &[&str] = &["deny", "decline", "reject"];

/// Whole message equals one of the keywords
pub fn is_exactly(text: &str, keywords: &[&str]) -> bool {
    let norm = normalize(text);
    keywords.iter().any(|k| norm == *k)
}

/// Message starts with one of the keywords as a whole word or phrase
pub fn starts_with_any(text: &str, keywords: &[&str]) -> bool {
    let norm = normalize(text);
    keywords.iter().any(|k| {
        norm == *k
            || norm
                .strip_prefix(k)
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

/// How a provider answered a booking request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderReply {
    Accept,
    Deny,
}

/// Classify a provider's message by its first word
pub fn provider_reply(text: &str) -> Option<ProviderReply> {
    let norm = normalize(text);
    let word = first_word(&norm);
    if PROVIDER_ACCEPT.contains(&word) {
        Some(ProviderReply::Accept)
    } else if PROVIDER_DENY.contains(&word) {
        Some(ProviderReply::Deny)
    } else {
        None
    }
}

// ============================================================================
// Service catalog
// ============================================================================

/// One `(pattern, canonical)` row of the service table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceKeyword {
    pub pattern: String,
    pub service: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("reading keyword file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing keyword file: {0}")]
    Parse(#[from] serde_json::Error),
}

// Home services come first so an unambiguous trade word beats a loose
// appliance or personal-service alias in the same message.
const BUILTIN: &[(&str, &str)] = &[
    ("plumber", "plumber"),
    ("plumbing", "plumber"),
    ("pipe", "plumber"),
    ("leak", "plumber"),
    ("electrician", "electrician"),
    ("electrical", "electrician"),
    ("wiring", "electrician"),
    ("carpenter", "carpenter"),
    ("carpentry", "carpenter"),
    ("painter", "painter"),
    ("painting", "painter"),
    ("cleaner", "cleaner"),
    ("cleaning", "cleaner"),
    ("mechanic", "mechanic"),
    ("car repair", "mechanic"),
    ("auto", "mechanic"),
    ("gardener", "gardener"),
    ("garden", "gardener"),
    ("landscaper", "gardener"),
    ("landscaping", "gardener"),
    ("lawn", "gardener"),
    ("mowing", "gardener"),
    ("grass cutter", "gardener"),
    ("yard", "gardener"),
    ("technician", "technician"),
    ("appliance", "technician"),
    ("fridge", "technician"),
    ("cctv", "technician"),
    ("dstv", "technician"),
    ("solar", "technician"),
    ("inverter", "technician"),
    ("aircon", "technician"),
    ("air conditioner", "technician"),
    ("software developer", "developer"),
    ("software engineer", "developer"),
    ("web developer", "developer"),
    ("web designer", "developer"),
    ("programmer", "developer"),
    ("developer", "developer"),
    ("coder", "developer"),
    ("laundry", "laundry"),
    ("ironing", "laundry"),
    ("gas refill", "gas"),
    ("gas", "gas"),
    ("tutor", "tutor"),
    ("lessons", "tutor"),
    ("catering", "catering"),
    ("chef", "catering"),
    ("photographer", "photography"),
    ("photography", "photography"),
    ("beautician", "beautician"),
    ("manicure", "beautician"),
    ("pedicure", "beautician"),
    ("nails", "beautician"),
    ("makeup", "beautician"),
    ("barber", "beautician"),
    ("salon", "beautician"),
    ("hair", "beautician"),
    ("fitness", "fitness"),
    ("personal trainer", "fitness"),
    ("massage", "massage"),
    ("accountant", "accountant"),
    ("bookkeeper", "accountant"),
    ("accounting", "accountant"),
    ("consultant", "consultant"),
    ("lawyer", "legal"),
    ("legal", "legal"),
    ("security guard", "security"),
    ("security", "security"),
    ("fumigation", "fumigation"),
    ("pest control", "fumigation"),
    ("upholstery", "interior"),
    ("decorator", "interior"),
    ("interior", "interior"),
    ("courier", "courier"),
    ("delivery", "courier"),
    ("errands", "courier"),
    ("car hire", "car"),
    ("car rental", "car"),
    ("event planner", "event"),
    ("dj", "event"),
    ("estate agent", "real"),
    ("real estate", "real"),
    ("borehole", "borehole"),
    ("drilling", "borehole"),
];

/// Ordered service keyword table. The first matching row wins.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    /// Normalized pattern words paired with the canonical service
    entries: Vec<(Vec<String>, String)>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ServiceCatalog {
    pub fn builtin() -> Self {
        let mut catalog = Self {
            entries: Vec::with_capacity(BUILTIN.len()),
        };
        catalog.extend(
            BUILTIN
                .iter()
                .map(|(pattern, service)| ServiceKeyword {
                    pattern: (*pattern).to_string(),
                    service: (*service).to_string(),
                }),
        );
        catalog
    }

    /// Built-in table followed by the rows from a JSON array of
    /// `{"pattern": .., "service": ..}` objects
    pub fn with_extra_json(json: &str) -> Result<Self, CatalogError> {
        let extra: Vec<ServiceKeyword> = serde_json::from_str(json)?;
        let mut catalog = Self::builtin();
        catalog.extend(extra);
        Ok(catalog)
    }

    pub fn with_extra_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::with_extra_json(&json)
    }

    fn extend(&mut self, rows: impl IntoIterator<Item = ServiceKeyword>) {
        for row in rows {
            let pattern = normalize(&row.pattern);
            let service = normalize(&row.service);
            if pattern.is_empty() || service.is_empty() {
                continue;
            }
            let pattern_words = words(&pattern).into_iter().map(str::to_string).collect();
            self.entries.push((pattern_words, service));
        }
    }

    /// Canonical service mentioned in free text, if any
    pub fn extract(&self, text: &str) -> Option<&str> {
        let norm = normalize(text);
        let hay = words(&norm);
        self.entries.iter().find_map(|(pattern, service)| {
            let pattern: Vec<&str> = pattern.iter().map(String::as_str).collect();
            find_phrase(&hay, &pattern, true).map(|_| service.as_str())
        })
    }

    /// Map an external answer (classifier output, provider input) onto a
    /// canonical service, or reject it
    pub fn canonicalize(&self, value: &str) -> Option<&str> {
        let norm = normalize(value);
        self.entries
            .iter()
            .map(|(_, service)| service.as_str())
            .find(|service| *service == norm)
            .or_else(|| self.extract(value))
    }

    /// Distinct canonical services in table order
    pub fn services(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for (_, service) in &self.entries {
            if !seen.contains(&service.as_str()) {
                seen.push(service);
            }
        }
        seen
    }
}
