use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PageRange;

static LETTER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}{4,}").unwrap());

/// Two keywords are treated as the same word at or above this similarity.
const TOKEN_SIMILARITY: f64 = 0.85;

fn filename_noise_token(token: &str) -> bool {
    matches!(
        token,
        "paper"
            | "article"
            | "review"
            | "draft"
            | "final"
            | "preprint"
            | "manuscript"
            | "supplement"
            | "supplementary"
            | "version"
            | "copy"
            | "full"
            | "text"
            | "fulltext"
            | "issue"
            | "journal"
            | "статья"
            | "статьи"
            | "выпуск"
            | "журнал"
            | "номер"
            | "финал"
            | "версия"
            | "итог"
            | "копия"
    )
}

/// Lowercase letter runs of at least four characters, generic filename words removed.
pub fn filename_keywords(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    LETTER_RUN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|token| !filename_noise_token(token))
        .collect()
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Jaccard overlap between keywords of a file name and of an article title.
/// Near-identical words (typos, inflection) count as shared.
pub fn filename_keyword_overlap(filename: &str, title: &str) -> f64 {
    let file_words = filename_keywords(file_stem(filename));
    let title_words = filename_keywords(title);
    if file_words.is_empty() || title_words.is_empty() {
        return 0.0;
    }

    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut shared = 0usize;
    for word in &file_words {
        let hit = title_words
            .iter()
            .filter(|t| !used.contains(t.as_str()))
            .find(|t| *t == word || strsim::normalized_levenshtein(word, t) >= TOKEN_SIMILARITY);
        if let Some(t) = hit {
            used.insert(t.as_str());
            shared += 1;
        }
    }

    let union = file_words.len() + title_words.len() - shared;
    shared as f64 / union as f64
}

/// True when the file name spells out the article's page span, with any dash.
/// The span must stand alone: `12-20` does not match inside `112-200`.
pub fn pages_in_filename(filename: &str, pages: &PageRange) -> bool {
    ['-', '–', '—'].iter().any(|dash| {
        let span = format!("{}{dash}{}", pages.start, pages.end);
        filename.match_indices(&span).any(|(at, _)| {
            let before = filename[..at].chars().next_back();
            let after = filename[at + span.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
        })
    })
}

/// Whether a file name carries any keyword to compare against a title.
pub fn filename_has_keywords(filename: &str) -> bool {
    !filename_keywords(file_stem(filename)).is_empty()
}

/// Whether a file name can carry a page-range signal at all.
pub fn filename_has_digits(filename: &str) -> bool {
    file_stem(filename).chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_short_and_noise_tokens() {
        let words = filename_keywords("Ivanov_final_article_5G_routing");
        let expected: BTreeSet<String> = ["ivanov", "routing"].iter().map(|s| s.to_string()).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn overlap_counts_exact_and_near_words() {
        let score = filename_keyword_overlap("routing_protocol_sensors.pdf", "Routing protocols for sensor networks");
        // routing, protocol~protocols, sensors~sensor shared; networks only in title
        assert!((score - 0.75).abs() < 1e-9, "score {score}");
    }

    #[test]
    fn overlap_without_keywords_is_zero() {
        assert_eq!(filename_keyword_overlap("001.pdf", "Routing protocols"), 0.0);
        assert_eq!(filename_keyword_overlap("routing.pdf", ""), 0.0);
    }

    #[test]
    fn cyrillic_filenames_are_tokenised() {
        let score = filename_keyword_overlap("Экология_рек.pdf", "Экология рек бассейна Волги");
        assert!(score > 0.0);
    }

    #[test]
    fn pages_found_with_any_dash() {
        let pages = PageRange::new(12, 20);
        assert!(pages_in_filename("article_12-20.pdf", &pages));
        assert!(pages_in_filename("article_12–20.pdf", &pages));
        assert!(!pages_in_filename("article_12_20.pdf", &pages));
    }

    #[test]
    fn page_span_needs_digit_boundaries() {
        let pages = PageRange::new(12, 20);
        assert!(!pages_in_filename("article_112-200.pdf", &pages));
        assert!(!pages_in_filename("article_12-205.pdf", &pages));
        assert!(!pages_in_filename("v112-20.pdf", &pages));
        assert!(pages_in_filename("12-20.pdf", &pages));
        assert!(pages_in_filename("112-200_12-20.pdf", &pages));
    }

    #[test]
    fn keyword_detection_uses_stem() {
        assert!(filename_has_keywords("routing_paper.pdf"));
        assert!(!filename_has_keywords("final_12-20.pdf"));
    }

    #[test]
    fn digits_detection_ignores_extension() {
        assert!(filename_has_digits("vol3_12-20.pdf"));
        assert!(!filename_has_digits("ivanov.pdf"));
    }
}
