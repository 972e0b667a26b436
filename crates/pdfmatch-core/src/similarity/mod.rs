//! Pure scoring functions used by the fuzzy matching phase.

pub mod authors;
pub mod filename;
pub mod title;

use std::collections::{BTreeMap, BTreeSet};

pub use authors::{author_similarity, normalize_surname};
pub use filename::{
    filename_has_digits, filename_has_keywords, filename_keyword_overlap, filename_keywords,
    pages_in_filename,
};
pub use title::{title_similarity, title_similarity_with};

/// Lowercase, punctuation turned into spaces, whitespace collapsed.
pub fn normalize_text(text: &str) -> String {
    let lowercase = text.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cosine similarity of two sparse vectors.
pub(crate) fn cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(key, va)| b.get(key).map(|vb| va * vb))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

pub(crate) fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_punctuation() {
        assert_eq!(normalize_text("  Hello,   World!  "), "hello world");
        assert_eq!(normalize_text("Сети 5G: обзор"), "сети 5g обзор");
        assert_eq!(normalize_text("..."), "");
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        let b: BTreeSet<&str> = ["c"].into_iter().collect();
        assert_eq!(jaccard(&a, &b), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }
}
