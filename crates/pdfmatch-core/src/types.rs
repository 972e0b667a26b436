use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PAGE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:стр|pages|page|pp|p|с)\.?\s*").unwrap());

static PAGE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:-|–|—|‐|‑|\.\.)\s*(\d+)").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Inclusive page span of an article in the printed issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Parses free-form page text such as `стр. 12–20`, `p. 5..9` or `33`.
    pub fn parse(text: &str) -> Option<Self> {
        let body = match PAGE_LABEL.find(text) {
            Some(m) => &text[m.end()..],
            None => text,
        };

        let span = PAGE_SPAN.captures(body).and_then(|caps| {
            let start = caps.get(1)?.as_str().parse().ok()?;
            let end = caps.get(2)?.as_str().parse().ok()?;
            Some(Self::new(start, end))
        });
        if span.is_some() {
            return span;
        }

        let numbers: Vec<u32> = NUMBER
            .find_iter(body)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        match numbers.as_slice() {
            [] => None,
            [single] => Some(Self::new(*single, *single)),
            [first, .., last] => Some(Self::new(*first, *last)),
        }
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A value kept separately for the Russian and English renditions of an article.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LangPair<T> {
    pub ru: T,
    pub en: T,
}

impl<T> LangPair<T> {
    pub fn both(&self) -> [&T; 2] {
        [&self.ru, &self.en]
    }

    pub fn get_mut(&mut self, lang: Lang) -> &mut T {
        match lang {
            Lang::Ru => &mut self.ru,
            Lang::En => &mut self.en,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ru,
    En,
}

impl Lang {
    /// Accepts `RUS`/`ru` and `ENG`/`en` in any case.
    pub fn from_attr(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rus" | "ru" => Some(Self::Ru),
            "eng" | "en" => Some(Self::En),
            _ => None,
        }
    }
}

/// Coarse tier of how much metadata could be recovered from a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionQuality {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ExtractionQuality {
    pub fn from_weight(weight: u32) -> Self {
        match weight {
            6.. => Self::High,
            3..=5 => Self::Medium,
            1..=2 => Self::Low,
            0 => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Where a PDF field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Embedded,
    Text,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PdfDocumentMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    pub doi_candidates: Vec<String>,
    pub edn: Option<String>,
    pub extraction_quality: ExtractionQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_source: Option<FieldSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors_source: Option<FieldSource>,
    pub pages_read: usize,
}

impl PdfDocumentMetadata {
    /// Metadata of a PDF that could not be read at all.
    pub fn unreadable() -> Self {
        Self::default()
    }

    /// Weighted presence of DOI (3), EDN (3), title (2) and authors (1).
    pub fn quality_weight(&self) -> u32 {
        let mut weight = 0;
        if self.doi.is_some() {
            weight += 3;
        }
        if self.edn.is_some() {
            weight += 3;
        }
        if self.title.is_some() {
            weight += 2;
        }
        if !self.authors.is_empty() {
            weight += 1;
        }
        weight
    }

    pub fn with_computed_quality(mut self) -> Self {
        self.extraction_quality = ExtractionQuality::from_weight(self.quality_weight());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_ranges() {
        assert_eq!(PageRange::parse("12-20"), Some(PageRange::new(12, 20)));
        assert_eq!(PageRange::parse("стр. 12–20"), Some(PageRange::new(12, 20)));
        assert_eq!(PageRange::parse("pp. 5 — 9"), Some(PageRange::new(5, 9)));
        assert_eq!(PageRange::parse("с. 101..115"), Some(PageRange::new(101, 115)));
    }

    #[test]
    fn swaps_reversed_ranges() {
        let range = PageRange::parse("20-12").unwrap();
        assert_eq!((range.start, range.end), (12, 20));
    }

    #[test]
    fn falls_back_to_first_and_last_number() {
        assert_eq!(PageRange::parse("from 3 to 7"), Some(PageRange::new(3, 7)));
        assert_eq!(PageRange::parse("page 33"), Some(PageRange::new(33, 33)));
    }

    #[test]
    fn oversized_span_falls_back_to_plain_numbers() {
        assert_eq!(
            PageRange::parse("99999999999-5, pages 7 and 9"),
            Some(PageRange::new(5, 9))
        );
        assert_eq!(PageRange::parse("99999999999-99999999999"), None);
    }

    #[test]
    fn no_numbers_means_no_range() {
        assert_eq!(PageRange::parse("n/a"), None);
        assert_eq!(PageRange::parse(""), None);
    }

    #[test]
    fn lang_attribute_variants() {
        assert_eq!(Lang::from_attr("RUS"), Some(Lang::Ru));
        assert_eq!(Lang::from_attr("en"), Some(Lang::En));
        assert_eq!(Lang::from_attr("Eng"), Some(Lang::En));
        assert_eq!(Lang::from_attr("de"), None);
    }

    #[test]
    fn quality_tiers_follow_weights() {
        let mut meta = PdfDocumentMetadata::unreadable();
        assert_eq!(meta.clone().with_computed_quality().extraction_quality, ExtractionQuality::None);

        meta.authors = vec!["Ivanov I.".into()];
        assert_eq!(meta.clone().with_computed_quality().extraction_quality, ExtractionQuality::Low);

        meta.title = Some("A title long enough".into());
        assert_eq!(meta.clone().with_computed_quality().extraction_quality, ExtractionQuality::Medium);

        meta.doi = Some("10.1000/x".into());
        assert_eq!(meta.with_computed_quality().extraction_quality, ExtractionQuality::High);
    }
}
