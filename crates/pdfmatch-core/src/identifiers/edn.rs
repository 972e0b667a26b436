use once_cell::sync::Lazy;
use regex::Regex;

/// Length of an eLIBRARY document number.
pub const EDN_LEN: usize = 6;

static EDN_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*edn(?:\s*[:：]|\s)").unwrap());

/// Uppercase ASCII alphanumerics of an EDN field, with an optional leading
/// `EDN:` label removed. `None` unless exactly six characters remain.
pub fn normalize_edn(input: &str) -> Option<String> {
    let body = match EDN_LABEL.find(input) {
        Some(m) => &input[m.end()..],
        None => input,
    };
    let normalized: String = body
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (normalized.len() == EDN_LEN).then_some(normalized)
}
