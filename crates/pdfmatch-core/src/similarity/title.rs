use std::collections::{BTreeMap, BTreeSet};

use crate::config::TitleBlend;
use crate::similarity::{cosine, jaccard, normalize_text};

/// Title similarity in `[0, 1]` with the default blend.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    title_similarity_with(a, b, &TitleBlend::default())
}

/// Blend of word cosine, word Jaccard, trigram Jaccard and word LCS ratio over
/// normalized titles. Identical normalized titles score exactly 1.0.
pub fn title_similarity_with(a: &str, b: &str, blend: &TitleBlend) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let total = blend.cosine + blend.word_jaccard + blend.trigram_jaccard + blend.lcs;
    if total <= 0.0 {
        return 0.0;
    }

    let a_words: Vec<&str> = a.split(' ').collect();
    let b_words: Vec<&str> = b.split(' ').collect();

    let score = blend.cosine * tf_cosine(&a_words, &b_words)
        + blend.word_jaccard * long_word_jaccard(&a_words, &b_words)
        + blend.trigram_jaccard * jaccard(&trigrams(&a), &trigrams(&b))
        + blend.lcs * lcs_ratio(&a_words, &b_words);
    (score / total).clamp(0.0, 1.0)
}

fn tf_vector(words: &[&str]) -> BTreeMap<String, f64> {
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| w.chars().count() > 2)
        .collect();
    let mut vector = BTreeMap::new();
    if kept.is_empty() {
        return vector;
    }
    let weight = 1.0 / kept.len() as f64;
    for word in kept {
        *vector.entry(word.to_string()).or_insert(0.0) += weight;
    }
    vector
}

fn tf_cosine(a: &[&str], b: &[&str]) -> f64 {
    cosine(&tf_vector(a), &tf_vector(b))
}

fn long_word_jaccard(a: &[&str], b: &[&str]) -> f64 {
    let long = |words: &[&str]| -> BTreeSet<String> {
        words
            .iter()
            .filter(|w| w.chars().count() > 3)
            .map(|w| w.to_string())
            .collect()
    };
    jaccard(&long(a), &long(b))
}

fn trigrams(text: &str) -> BTreeSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return std::iter::once(text.to_string()).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Longest common word subsequence over the shorter title's word count.
fn lcs_ratio(a: &[&str], b: &[&str]) -> f64 {
    let shorter = a.len().min(b.len());
    if shorter == 0 {
        return 0.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for wa in a {
        for (j, wb) in b.iter().enumerate() {
            curr[j + 1] = if wa == wb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()] as f64 / shorter as f64
}
