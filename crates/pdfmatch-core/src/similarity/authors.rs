use std::collections::{BTreeMap, BTreeSet};

use crate::similarity::cosine;

const PREFIX_LEN: usize = 5;
const PREFIX_BONUS_STEP: f64 = 0.15;
const PREFIX_BONUS_CAP: f64 = 0.3;

/// Lowercase surname with `ё` folded to `е`, Latin diacritics removed and
/// everything except letters and hyphens dropped.
pub fn normalize_surname(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .filter(|c| c.is_alphabetic() || *c == '-')
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'ё' => 'е',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'ł' | 'ľ' | 'ĺ' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' | 'ŕ' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Surname of a free-form PDF author string: its first token.
fn pdf_surname(author: &str) -> String {
    author
        .split(|c: char| c == ',' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .map(normalize_surname)
        .unwrap_or_default()
}

/// Similarity of the author list found in a PDF against manifest surnames.
pub fn author_similarity(pdf_authors: &[String], xml_surnames: &[String]) -> f64 {
    let pdf: BTreeSet<String> = pdf_authors
        .iter()
        .map(|a| pdf_surname(a))
        .filter(|s| !s.is_empty())
        .collect();
    let xml: BTreeSet<String> = xml_surnames
        .iter()
        .map(|s| normalize_surname(s))
        .filter(|s| !s.is_empty())
        .collect();
    if pdf.is_empty() || xml.is_empty() {
        return 0.0;
    }

    let exact = pdf.intersection(&xml).count() as f64 / pdf.len().max(xml.len()) as f64;

    let presence = |set: &BTreeSet<String>| -> BTreeMap<String, f64> {
        set.iter().map(|s| (s.clone(), 1.0)).collect()
    };
    let cosine_score = cosine(&presence(&pdf), &presence(&xml));

    let bonus = if exact < 1.0 {
        prefix_bonus(&pdf, &xml)
    } else {
        0.0
    };

    (0.3 * exact + 0.6 * cosine_score + 0.1 * bonus).min(1.0)
}

/// Credit for differing surnames that share a 5-letter prefix, which covers
/// transliteration variants and OCR typos.
fn prefix_bonus(pdf: &BTreeSet<String>, xml: &BTreeSet<String>) -> f64 {
    let prefix = |s: &str| -> Option<String> {
        (s.chars().count() >= PREFIX_LEN).then(|| s.chars().take(PREFIX_LEN).collect())
    };

    let mut seen = BTreeSet::new();
    let mut bonus = 0.0;
    for p in pdf {
        let Some(p_prefix) = prefix(p) else {
            continue;
        };
        let hit = xml
            .iter()
            .find(|x| *x != p && prefix(x).as_deref() == Some(p_prefix.as_str()));
        if hit.is_some() && seen.insert(p_prefix) {
            bonus += PREFIX_BONUS_STEP;
        }
    }
    bonus.min(PREFIX_BONUS_CAP)
}
