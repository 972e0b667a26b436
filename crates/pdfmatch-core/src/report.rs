use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SignalWeights;
use crate::types::ExtractionQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    EdnExact,
    DoiExact,
    DoiPartial,
    Fuzzy,
    FuzzyElimination,
    FuzzyAmbiguousBest,
    Unmatched,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdnExact => "edn_exact",
            Self::DoiExact => "doi_exact",
            Self::DoiPartial => "doi_partial",
            Self::Fuzzy => "fuzzy",
            Self::FuzzyElimination => "fuzzy_elimination",
            Self::FuzzyAmbiguousBest => "fuzzy_ambiguous_best",
            Self::Unmatched => "unmatched",
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, Self::EdnExact | Self::DoiExact | Self::DoiPartial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier of a fuzzy score under the effective thresholds.
    pub fn from_score(score: f64, thresholds: &EffectiveThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// Deferred by the margin rule and no candidate PDF was left.
    Ambiguous,
    /// Candidates existed but scored below the floor or were claimed elsewhere.
    LowScore,
    NoCandidate,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ambiguous => "ambiguous",
            Self::LowScore => "low_score",
            Self::NoCandidate => "no_candidate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Doi,
    Edn,
}

/// Non-fatal conditions collected during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchWarning {
    Extraction {
        pdf: String,
        message: String,
    },
    AmbiguousMatch {
        article_index: usize,
        best: f64,
        second: f64,
    },
    DuplicateIdentifier {
        identifier: IdentifierKind,
        value: String,
        article_indices: Vec<usize>,
    },
    AmbiguousPartialDoi {
        pdf: String,
        doi: String,
    },
    SkippedEntry {
        entry: String,
        reason: String,
    },
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction { pdf, message } => write!(f, "{pdf}: extraction failed: {message}"),
            Self::AmbiguousMatch {
                article_index,
                best,
                second,
            } => write!(
                f,
                "article #{article_index}: ambiguous candidates ({best:.3} vs {second:.3})"
            ),
            Self::DuplicateIdentifier {
                identifier,
                value,
                article_indices,
            } => write!(
                f,
                "{} {value} shared by articles {article_indices:?}",
                match identifier {
                    IdentifierKind::Doi => "DOI",
                    IdentifierKind::Edn => "EDN",
                }
            ),
            Self::AmbiguousPartialDoi { pdf, doi } => {
                write!(f, "{pdf}: DOI {doi} partially matches several articles")
            }
            Self::SkippedEntry { entry, reason } => write!(f, "skipped {entry}: {reason}"),
        }
    }
}

/// Per-signal scores of a fuzzy pair. `None` marks an unavailable signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub title: Option<f64>,
    pub authors: Option<f64>,
    pub pages: Option<f64>,
    pub filename: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub article_index: usize,
    pub article_id: Option<String>,
    pub article_title: Option<String>,
    pub pdf_filename: Option<String>,
    pub score: f64,
    pub method: MatchMethod,
    pub confidence: Confidence,
    pub doi: Option<String>,
    pub edn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnmatchedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentScores>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        self.pdf_filename.is_some()
    }
}

/// What happened to one PDF of the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfDiagnostic {
    pub filename: String,
    pub archive_path: String,
    pub quality: ExtractionQuality,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub doi: Option<String>,
    pub edn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doi_candidates: Vec<String>,
    pub assigned_to: Option<usize>,
    /// Carries an unknown well-formed DOI, so it never entered fuzzy matching.
    pub rejected_foreign_doi: bool,
}

/// Thresholds actually applied after adaptive recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveThresholds {
    pub min_score: f64,
    pub medium: f64,
    pub high: f64,
    pub margin: f64,
    pub calibrated: bool,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub bundle: String,
    pub total_articles: usize,
    pub matched_articles: usize,
    pub unmatched_articles: usize,
    pub cleanup_removed: usize,
    pub results: Vec<MatchResult>,
    pub warnings: Vec<MatchWarning>,
    pub pdfs: Vec<PdfDiagnostic>,
    pub thresholds: EffectiveThresholds,
    pub weights: SignalWeights,
}

impl MatchReport {
    pub fn new(
        run_id: impl Into<String>,
        bundle: impl Into<String>,
        results: Vec<MatchResult>,
        thresholds: EffectiveThresholds,
        weights: SignalWeights,
    ) -> Self {
        let total_articles = results.len();
        let matched_articles = results.iter().filter(|r| r.is_matched()).count();
        Self {
            run_id: run_id.into(),
            generated_at: Utc::now(),
            bundle: bundle.into(),
            total_articles,
            matched_articles,
            unmatched_articles: total_articles - matched_articles,
            cleanup_removed: 0,
            results,
            warnings: Vec::new(),
            pdfs: Vec::new(),
            thresholds,
            weights,
        }
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| !r.is_matched())
    }

    pub fn count_by_method(&self, method: MatchMethod) -> usize {
        self.results.iter().filter(|r| r.method == method).count()
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} articles matched ({} unmatched, {} warnings)",
            self.matched_articles,
            self.total_articles,
            self.unmatched_articles,
            self.warnings.len()
        )
    }
}
