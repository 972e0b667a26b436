use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::doi::Doi;
use crate::identifiers::edn::normalize_edn;

static DOI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<label>\bdoi\s*[:：]?\s*)?(?:(?:https?://)?(?:dx\.)?doi\.org/)?(?P<doi>10\.\d{3,9}/[^\s"<>\[\]]+)"#,
    )
    .unwrap()
});

static CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:\r?\n)[ \t]*([^\s"<>\[\]]+)"#).unwrap());

static EDN_LABELLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bEDN\b\s*[:：]?\s*([A-Za-z0-9]{6})\b").unwrap());

static EDN_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)elibrary|document\s+number|номер\s+документа").unwrap());

static EDN_NEAR_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z0-9]{6})\b").unwrap());

/// Characters after an EDN hint that are searched for the number itself.
const HINT_WINDOW_CHARS: usize = 80;
const MAX_CONTINUATION_LINES: usize = 3;

/// Every distinct DOI found in a text, plus the one judged most trustworthy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoiScan {
    pub primary: Option<String>,
    pub candidates: Vec<String>,
}

struct ScoredDoi {
    normalized: String,
    score: u32,
}

/// Scans text for DOIs, following matches that were wrapped onto the next line.
pub fn extract_doi_candidates(text: &str) -> DoiScan {
    let mut found: Vec<ScoredDoi> = Vec::new();

    for caps in DOI_REGEX.captures_iter(text) {
        let Some(m) = caps.name("doi") else {
            continue;
        };
        let labelled = caps.name("label").is_some();
        let raw = extend_across_line_wraps(text, m.as_str(), m.end());

        let Some(doi) = Doi::parse(&raw) else {
            continue;
        };
        let score = doi_quality(&doi, labelled);
        match found.iter_mut().find(|d| d.normalized == doi.normalized) {
            Some(existing) => existing.score = existing.score.max(score),
            None => found.push(ScoredDoi {
                normalized: doi.normalized,
                score,
            }),
        }
    }

    // max_by_key keeps the last maximum; scan in reverse so ties go to the earliest
    let primary = found
        .iter()
        .rev()
        .max_by_key(|d| d.score)
        .map(|d| d.normalized.clone());

    DoiScan {
        primary,
        candidates: found.into_iter().map(|d| d.normalized).collect(),
    }
}

fn extend_across_line_wraps(text: &str, matched: &str, mut end: usize) -> String {
    let mut raw = matched.to_string();
    for _ in 0..MAX_CONTINUATION_LINES {
        let wrapped = raw.ends_with(['-', '.', '_', '/']);
        if !wrapped {
            break;
        }
        let Some(caps) = CONTINUATION.captures(&text[end..]) else {
            break;
        };
        let Some(next) = caps.get(1) else {
            break;
        };
        raw.push_str(next.as_str());
        end += next.end();
    }
    raw
}

/// Structural plausibility of a DOI occurrence. Higher is better.
fn doi_quality(doi: &Doi, labelled: bool) -> u32 {
    let mut score = 0;
    if labelled {
        score += 3;
    }
    score += match doi.registrant().len() {
        4 | 5 => 2,
        _ => 1,
    };
    let suffix = doi.suffix();
    if (5..=40).contains(&suffix.chars().count()) {
        score += 2;
    }
    if suffix.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        score += 1;
    }
    score
}

/// First valid EDN in the text: right after an `EDN` keyword, else close to an
/// eLIBRARY hint.
pub fn extract_edn(text: &str) -> Option<String> {
    for caps in EDN_LABELLED.captures_iter(text) {
        if let Some(edn) = caps.get(1).and_then(|m| normalize_edn(m.as_str())) {
            return Some(edn);
        }
    }

    for hint in EDN_HINT.find_iter(text) {
        let window = window_after(text, hint.end(), HINT_WINDOW_CHARS);
        let hints: Vec<_> = EDN_HINT.find_iter(window).map(|m| m.range()).collect();
        let tokens: Vec<&str> = EDN_NEAR_HINT
            .captures_iter(window)
            .filter_map(|caps| caps.get(1))
            .filter(|m| !hints.iter().any(|h| h.start < m.end() && m.start() < h.end))
            .map(|m| m.as_str())
            .filter(|token| token.chars().any(|c| c.is_ascii_alphabetic()))
            .collect();
        // Printed EDNs are upper case; a lower-case token is more likely a word.
        let upper = tokens
            .iter()
            .find(|token| !token.chars().any(|c| c.is_ascii_lowercase()));
        if let Some(edn) = upper.or(tokens.first()).and_then(|t| normalize_edn(t)) {
            return Some(edn);
        }
    }
    None
}

fn window_after(text: &str, start: usize, max_chars: usize) -> &str {
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    &rest[..end]
}
