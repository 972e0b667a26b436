use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:https?://)?(?:dx\.)?doi\.org/").unwrap());

static LABEL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^doi\s*[:：]?\s+|^doi\s*[:：]").unwrap());

static VALID_DOI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{3,9}/\S+$").unwrap());

const TRAILING_PUNCTUATION: &[char] = &[')', '.', ',', ';', ']', ':'];

/// Canonical form of a DOI: no `doi:` label, no resolver URL, no trailing
/// punctuation, lowercase. Applying it twice gives the same result.
pub fn normalize_doi(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn normalize_once(input: &str) -> String {
    let mut s = input.trim();
    if let Some(m) = URL_PREFIX.find(s) {
        s = s[m.end()..].trim_start();
    }
    if let Some(m) = LABEL_PREFIX.find(s) {
        s = s[m.end()..].trim_start();
    }
    let s = s.trim_end_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c));
    s.to_lowercase()
}

/// Structural check on an already normalized DOI:
/// `10.` + 3 to 9 digits + `/` + non-empty suffix.
pub fn is_valid_doi(normalized: &str) -> bool {
    VALID_DOI.is_match(normalized)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = normalize_doi(input);
        if !is_valid_doi(&normalized) {
            return None;
        }
        let url = format!("https://doi.org/{normalized}");
        Some(Self {
            raw: input.trim().to_string(),
            normalized,
            url,
        })
    }

    /// Digits between `10.` and the first `/`.
    pub fn registrant(&self) -> &str {
        let rest = &self.normalized[3..];
        rest.split('/').next().unwrap_or("")
    }

    pub fn suffix(&self) -> &str {
        self.normalized
            .split_once('/')
            .map(|(_, suffix)| suffix)
            .unwrap_or("")
    }
}
