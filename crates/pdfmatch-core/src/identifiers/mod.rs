//! DOI and EDN normalization, validation and discovery in free text.

pub mod doi;
pub mod edn;
pub mod extract;

pub use doi::{Doi, is_valid_doi, normalize_doi};
pub use edn::normalize_edn;
pub use extract::{DoiScan, extract_doi_candidates, extract_edn};

/// True when one identifier is a strict prefix of the other and the longer one
/// adds at most half the length of the shorter. Models a truncated extraction.
pub fn identifiers_partially_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() || a == b {
        return false;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if !longer.starts_with(shorter) {
        return false;
    }
    let short_len = shorter.chars().count();
    let diff = longer.chars().count() - short_len;
    diff <= short_len / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_doi_partially_matches() {
        assert!(identifiers_partially_match("10.31854/1813-324x-2023-9", "10.31854/1813-324x-2023-9-1-5"));
        assert!(identifiers_partially_match("10.31854/1813-324x-2023-9-1-5", "10.31854/1813-324x-2023-9"));
    }

    #[test]
    fn equal_identifiers_are_not_partial() {
        assert!(!identifiers_partially_match("10.1000/abc", "10.1000/abc"));
    }

    #[test]
    fn too_short_prefix_is_rejected() {
        // 7 extra chars on a 7-char prefix
        assert!(!identifiers_partially_match("10.1000", "10.1000/abcdef"));
        assert!(!identifiers_partially_match("", "10.1000/abc"));
    }

    #[test]
    fn non_prefix_is_rejected() {
        assert!(!identifiers_partially_match("10.1000/abd", "10.1000/abcdef"));
    }
}
