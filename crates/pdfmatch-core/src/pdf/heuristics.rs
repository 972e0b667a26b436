use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ExtractionConfig;

static MASTHEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)труды\s+учебных\s+заведений|proceedings\s+of\s+telecommunication|известия\s+вузов|прикладная\s+химия|журнал|\bjournal\b|\bissn\b|\bvolume\b|\bтом\b",
    )
    .expect("valid regex")
});

static SERVICE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:труды|proceedings|известия|вестник|журнал|journal|bulletin|университет|university|институт|institute|издательство|publisher|issn|eissn|том|volume|выпуск|issue|номер|number|страница|page|стр|pp|bmv|bmw)\b|российская\s+федерация|russian\s+federation",
    )
    .expect("valid regex")
});

static SECTION_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:abstract|аннотация|keywords|key\s+words|ключевые\s+слова|doi|introduction|введение|резюме|summary)\b|\b(?:abstract|аннотация|keywords|ключевые\s+слова|doi)\s*[:.]",
    )
    .expect("valid regex")
});

static VOLUME_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:том|volume|vol|выпуск|issue|no|год|year)\.?\s*\d+|№\s*\d+")
        .expect("valid regex")
});

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:российская\s+федерация|russian\s+federation|\bstreet\b|\bavenue\b)|\bг\.\s|\bул\.|\bпр\.")
        .expect("valid regex")
});

static REF_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\d+\]").expect("valid regex"));

static AUTHOR_INITIALS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[А-ЯЁA-Z][а-яёa-z]+(?:-[А-ЯЁA-Z][а-яёa-z]+)?\s+[А-ЯЁA-Z]\.\s*(?:[А-ЯЁA-Z]\.)?")
        .expect("valid regex")
});

static AUTHOR_COMMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([А-ЯЁA-Z][а-яёa-z]+(?:-[А-ЯЁA-Z][а-яёa-z]+)?),\s*([А-ЯЁA-Z]\.\s*(?:[А-ЯЁA-Z]\.)?)")
        .expect("valid regex")
});

static INITIALS_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[А-ЯЁA-Z]\.\s*(?:[А-ЯЁA-Z]\.\s*)?[А-ЯЁA-Z][а-яёa-z]+")
        .expect("valid regex")
});

static AUTHOR_ONLY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[А-ЯЁA-Z][а-яёa-z]+\s+[А-ЯЁA-Z]\.\s*(?:[А-ЯЁA-Z]\.)?\s*$").expect("valid regex")
});

static CAPITALIZED_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[А-ЯЁA-Z][а-яёa-z]+(?:-[А-ЯЁA-Z][а-яёa-z]+)?$").expect("valid regex")
});

static INITIALS_FIRST_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([А-ЯЁA-Z]\.\s*(?:[А-ЯЁA-Z]\.)?)\s*([А-ЯЁA-Z][а-яёa-z]+(?:-[А-ЯЁA-Z][а-яёa-z]+)?)$")
        .expect("valid regex")
});

static AUTHOR_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,;]\s*|\s+и\s+|\s+and\s+").expect("valid regex"));

static INITIAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[А-ЯЁA-Z]\.").expect("valid regex"));

/// Lines scanned for the title.
const TITLE_SCAN_LINES: usize = 50;
/// Lines scanned for authors after the title region.
const AUTHOR_SCAN_LINES: usize = 40;
/// Masthead lines are expected within this many leading lines.
const MASTHEAD_LINES: usize = 10;

// ─── Embedded metadata ─────────────────────────────────────

pub fn normalize_inline_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn clean_pdf_metadata_field(raw: &str) -> Option<String> {
    let without_nul = raw.replace('\0', " ");
    let normalized = normalize_inline_whitespace(&without_nul);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn is_all_uppercase(value: &str) -> bool {
    let mut letters = value.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

pub fn is_masthead(value: &str) -> bool {
    MASTHEAD_RE.is_match(&value.to_lowercase())
}

/// Embedded `/Title` after the quality filter.
pub fn accept_embedded_title(raw: &str, config: &ExtractionConfig) -> Option<String> {
    let title = clean_pdf_metadata_field(raw)?;
    let len = title.chars().count();
    if len < config.title_min_chars || len > config.title_max_chars {
        return None;
    }
    if is_masthead(&title) {
        return None;
    }
    if is_all_uppercase(&title) && len > config.uppercase_title_max_chars {
        return None;
    }
    Some(title)
}

/// Embedded `/Author` split on `,`/`;` with producer artifacts removed.
pub fn filter_embedded_authors(raw: &str, config: &ExtractionConfig) -> Vec<String> {
    let Some(cleaned) = clean_pdf_metadata_field(raw) else {
        return Vec::new();
    };
    let mut authors: Vec<String> = Vec::new();
    for part in cleaned.split([',', ';']).map(str::trim) {
        let len = part.chars().count();
        let lower = part.to_lowercase();
        if len < 3 || lower == "bmv" || lower == "bmw" {
            continue;
        }
        if is_all_uppercase(part) && len <= 5 {
            continue;
        }
        if !part.chars().any(char::is_alphabetic) {
            continue;
        }
        push_unique_ci(&mut authors, part.to_string());
    }
    authors.truncate(config.max_authors);
    authors
}

fn push_unique_ci(target: &mut Vec<String>, value: String) {
    let lower = value.to_lowercase();
    if !target.iter().any(|existing| existing.to_lowercase() == lower) {
        target.push(value);
    }
}

// ─── Text lines ────────────────────────────────────────────

/// Non-empty lines of extracted text with inline whitespace collapsed.
pub fn text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(normalize_inline_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_section_marker(line: &str) -> bool {
    SECTION_MARKER_RE.is_match(line)
}

fn is_masthead_line(line: &str, index: usize) -> bool {
    if is_masthead(line) {
        return true;
    }
    if index < MASTHEAD_LINES && SERVICE_LINE_RE.is_match(line) {
        return true;
    }
    index < 8 && is_all_uppercase(line) && line.chars().count() > 30
}

fn is_noise_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    line.contains('@')
        || lower.contains("http")
        || lower.contains("www.")
        || VOLUME_MARKER_RE.is_match(line)
        || ADDRESS_RE.is_match(line)
}

fn is_title_line(line: &str) -> bool {
    let len = line.chars().count();
    if !(8..=300).contains(&len) {
        return false;
    }
    if is_noise_line(line) || is_section_marker(line) || REF_MARKER_RE.is_match(line) {
        return false;
    }
    let lower = line.to_lowercase();
    if ["удк", "udc", "copyright", "©", "received", "поступила", "получено", "accepted"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return false;
    }
    if AUTHOR_ONLY_LINE_RE.is_match(line) || looks_like_author_list(line) || is_author_line(line) {
        return false;
    }
    let signal = line
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_ascii_punctuation())
        .count();
    (signal as f32 / len as f32) < 0.35
}

fn is_title_continuation(line: &str) -> bool {
    line.chars().count() > 10 && is_title_line(line) && !is_masthead(line)
}

// ─── Title ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TitleCandidate {
    pub text: String,
    pub first_line: usize,
    pub last_line: usize,
}

fn finalize_title(lines: &[&str], first_line: usize, last_line: usize) -> Option<TitleCandidate> {
    let joined = normalize_inline_whitespace(&lines.join(" "));
    let text = joined.trim_end_matches(['.', ',', ';']).trim().to_string();
    let len = text.chars().count();
    let words = text.split_whitespace().filter(|w| w.chars().count() > 2).count();
    if !(15..=400).contains(&len) || words < 3 || is_masthead(&text) {
        return None;
    }
    Some(TitleCandidate {
        text,
        first_line,
        last_line,
    })
}

/// Skips the masthead, then collects lines until the title is long enough.
fn title_after_masthead(lines: &[String]) -> Option<TitleCandidate> {
    let mut collected: Vec<&str> = Vec::new();
    let mut first = 0;
    let mut last = 0;
    for (i, line) in lines.iter().enumerate().take(TITLE_SCAN_LINES) {
        if is_section_marker(line) {
            break;
        }
        if is_masthead_line(line, i) || !is_title_line(line) {
            if collected.is_empty() {
                continue;
            }
            break;
        }
        if collected.is_empty() {
            first = i;
        }
        collected.push(line);
        last = i;
        if collected.iter().map(|l| l.chars().count() + 1).sum::<usize>() > 50 {
            if let Some(next) = lines.get(i + 1) {
                if is_title_continuation(next) {
                    collected.push(next);
                    last = i + 1;
                }
            }
            break;
        }
    }
    if collected.is_empty() {
        return None;
    }
    finalize_title(&collected, first, last)
}

/// Best single line by score, extended by up to two continuation lines.
fn best_scored_line(lines: &[String]) -> Option<TitleCandidate> {
    let (_, best) = lines
        .iter()
        .enumerate()
        .take(TITLE_SCAN_LINES)
        .take_while(|(_, line)| !is_section_marker(line))
        .filter(|(i, line)| is_title_line(line) && !is_masthead_line(line, *i))
        .map(|(i, line)| (score_title_candidate(line, i), i))
        .filter(|(score, _)| *score > 0)
        .max_by(|(score_a, idx_a), (score_b, idx_b)| score_a.cmp(score_b).then_with(|| idx_b.cmp(idx_a)))?;

    let mut collected: Vec<&str> = vec![lines[best].as_str()];
    let mut last = best;
    while collected.len() < 3 {
        let Some(next) = lines.get(last + 1) else {
            break;
        };
        let current_ends_sentence = lines[last].ends_with('.');
        if current_ends_sentence || !is_title_continuation(next) {
            break;
        }
        collected.push(next);
        last += 1;
    }
    finalize_title(&collected, best, last)
}

/// Up to three title-like lines directly above the first author line.
fn block_before_authors(lines: &[String]) -> Option<TitleCandidate> {
    let author_idx = lines
        .iter()
        .take(AUTHOR_SCAN_LINES)
        .take_while(|line| !is_section_marker(line))
        .position(|line| is_author_line(line))?;

    let mut collected: Vec<&str> = Vec::new();
    let mut first = author_idx;
    for j in (0..author_idx).rev() {
        let line = &lines[j];
        if collected.len() == 3 || !is_title_line(line) || is_masthead(line) {
            break;
        }
        collected.push(line);
        first = j;
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    finalize_title(&collected, first, author_idx - 1)
}

/// Title found in page text by competing strategies; best score wins.
pub fn extract_title(lines: &[String]) -> Option<TitleCandidate> {
    let strategies: [(fn(&[String]) -> Option<TitleCandidate>, i32); 3] = [
        (block_before_authors, 6),
        (title_after_masthead, 4),
        (best_scored_line, 0),
    ];

    let mut best: Option<(i32, TitleCandidate)> = None;
    for (strategy, bonus) in strategies {
        let Some(candidate) = strategy(lines) else {
            continue;
        };
        let score = score_title_candidate(&candidate.text, candidate.first_line) + bonus;
        tracing::debug!(title = %candidate.text, score, "title candidate");
        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, candidate)| candidate)
}

pub fn score_title_candidate(value: &str, line_index: usize) -> i32 {
    let mut score = 0i32;
    let trimmed = value.trim();
    let words = trimmed.split_whitespace().count();
    score += match words {
        3..=14 => 32,
        15..=25 => 18,
        2 => 8,
        _ => -8,
    };

    if line_index <= 24 {
        score += 24 - i32::try_from(line_index).unwrap_or(24);
    }

    if trimmed.ends_with('.') {
        score -= 4;
    } else {
        score += 4;
    }
    let has_upper = trimmed.chars().any(char::is_uppercase);
    let has_lower = trimmed.chars().any(char::is_lowercase);
    if has_upper && has_lower {
        score += 4;
    } else if has_upper {
        score -= 2;
    }
    if trimmed.contains(':') {
        score += 2;
    }
    if trimmed.matches(',').count() > 1 {
        score -= 5;
    }
    if trimmed.contains('@') {
        score -= 15;
    }
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        score -= 4;
    }
    if looks_like_author_list(trimmed) {
        score -= 36;
    }
    score
}

fn looks_like_nameish_token(value: &str) -> bool {
    let letters: String = value.chars().filter(|c| c.is_alphabetic()).collect();
    let mut chars = letters.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase() && chars.any(char::is_lowercase)
}

pub fn looks_like_author_list(value: &str) -> bool {
    if value.contains('@') {
        return true;
    }
    if AUTHOR_INITIALS_RE.find_iter(value).count() >= 2 {
        return true;
    }
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    let has_separator =
        value.contains(',') || value.contains(" and ") || value.contains(" и ") || value.contains('&');
    let nameish = words.iter().filter(|w| looks_like_nameish_token(w)).count();
    has_separator && nameish >= 3 && nameish * 2 > words.len()
}

// ─── Authors ───────────────────────────────────────────────

fn is_full_name_list(line: &str) -> bool {
    if line.chars().count() > 150 {
        return false;
    }
    let parts: Vec<&str> = AUTHOR_SPLIT_RE
        .split(line)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return false;
    }
    let mut has_three_words = false;
    for part in &parts {
        let words: Vec<&str> = part.split_whitespace().collect();
        if !(2..=3).contains(&words.len()) || !words.iter().all(|w| CAPITALIZED_WORD_RE.is_match(w)) {
            return false;
        }
        has_three_words |= words.len() == 3;
    }
    has_three_words
}

/// `Surname I.O.`, `Surname, I.O.`, `I.O. Surname` or `Surname Name Patronymic`.
pub fn is_author_line(line: &str) -> bool {
    let len = line.chars().count();
    if !(5..=250).contains(&len) || line.contains('@') || line.to_lowercase().contains("http") {
        return false;
    }
    if !line.chars().any(char::is_lowercase) {
        return false;
    }
    AUTHOR_INITIALS_RE.is_match(line)
        || AUTHOR_COMMA_RE.is_match(line)
        || INITIALS_FIRST_RE.is_match(line)
        || is_full_name_list(line)
}

fn author_parts(line: &str) -> Vec<String> {
    // joining `Surname, I.O.` would mangle an `I.O. Surname, I.O. Surname` list
    let initials_first = INITIALS_FIRST_RE.find(line).is_some_and(|m| m.start() == 0);
    let line = if initials_first {
        std::borrow::Cow::Borrowed(line)
    } else {
        AUTHOR_COMMA_RE.replace_all(line, "$1 $2")
    };
    let mut authors = Vec::new();
    for part in AUTHOR_SPLIT_RE.split(&line).map(str::trim) {
        let len = part.chars().count();
        if !(5..=120).contains(&len) {
            continue;
        }
        if is_all_uppercase(part) && len <= 8 {
            continue;
        }
        if !(INITIAL_RE.is_match(part) || part.split_whitespace().count() >= 2) {
            continue;
        }
        let cleaned: String = part
            .chars()
            .filter(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '.' | '-' | '\''))
            .collect();
        let cleaned = normalize_inline_whitespace(&cleaned);
        if !cleaned.chars().any(char::is_lowercase) {
            continue;
        }
        let lower = cleaned.to_lowercase();
        if lower == "bmv" || lower == "bmw" || cleaned.chars().count() <= 5 {
            continue;
        }
        authors.push(surname_first(&cleaned));
    }
    authors
}

/// `И.И. Иванов` becomes `Иванов И.И.` so the surname is the first token.
fn surname_first(author: &str) -> String {
    match INITIALS_FIRST_PART_RE.captures(author) {
        Some(caps) => {
            let initials: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            format!("{} {initials}", &caps[2])
        }
        None => author.to_string(),
    }
}

fn scan_authors(lines: &[String], start: usize, max_authors: usize) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (offset, line) in lines.iter().skip(start).take(AUTHOR_SCAN_LINES).enumerate() {
        if is_section_marker(line) {
            break;
        }
        let len = line.chars().count();
        if SERVICE_LINE_RE.is_match(line) || is_noise_line(line) || len < 5 || len > 250 {
            continue;
        }
        if is_all_uppercase(line) && len > 30 {
            continue;
        }
        if !is_author_line(line) {
            continue;
        }

        for author in author_parts(line) {
            push_unique_ci(&mut found, author);
        }
        if let Some(next) = lines.get(start + offset + 1) {
            let continues = AUTHOR_INITIALS_RE.is_match(next)
                || AUTHOR_COMMA_RE.is_match(next)
                || INITIALS_FIRST_RE.is_match(next);
            if continues && !is_section_marker(next) && !is_noise_line(next) {
                for author in author_parts(next) {
                    push_unique_ci(&mut found, author);
                }
            }
        }
        if !found.is_empty() {
            break;
        }
    }
    found.truncate(max_authors);
    found
}

/// Authors listed after the title region, falling back to the whole page.
pub fn extract_authors(lines: &[String], after_line: Option<usize>, max_authors: usize) -> Vec<String> {
    if let Some(line) = after_line {
        let found = scan_authors(lines, line + 1, max_authors);
        if !found.is_empty() {
            return found;
        }
    }
    scan_authors(lines, 0, max_authors)
}
