//! Assigns PDFs to manifest articles.
//!
//! Phases run in strict precedence: EDN equality, DOI equality (then a
//! truncated-DOI prefix match), and finally fuzzy scoring over whatever is
//! left. Each PDF and each article is assigned at most once.

pub mod calibration;
pub mod fuzzy;
pub mod identifier;

use tracing::info;

use crate::config::MatcherConfig;
use crate::manifest::ArticleRecord;
use crate::report::{
    ComponentScores, Confidence, EffectiveThresholds, MatchMethod, MatchResult, MatchWarning,
    PdfDiagnostic, UnmatchedReason,
};
use crate::types::PdfDocumentMetadata;

pub use calibration::calibrate;
pub use fuzzy::{PairScore, score_pair};

/// A PDF ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfCandidate {
    /// Base name, as written into the manifest.
    pub filename: String,
    pub archive_path: String,
    pub metadata: PdfDocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub article_index: usize,
    pub pdf_index: usize,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Ordered by article index.
    pub assignments: Vec<Assignment>,
    /// One per article, ordered by article index.
    pub results: Vec<MatchResult>,
    pub warnings: Vec<MatchWarning>,
    pub thresholds: EffectiveThresholds,
    pub pdfs: Vec<PdfDiagnostic>,
}

impl MatchOutcome {
    pub fn pdf_for_article(&self, article_index: usize) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.article_index == article_index)
            .map(|a| a.pdf_index)
    }
}

/// Mutable bookkeeping shared by the phases.
#[derive(Debug)]
pub(crate) struct MatchState {
    article_pdf: Vec<Option<usize>>,
    pdf_article: Vec<Option<usize>>,
    results: Vec<Option<MatchResult>>,
    rejected: Vec<bool>,
    pub(crate) warnings: Vec<MatchWarning>,
}

impl MatchState {
    pub(crate) fn new(articles: usize, pdfs: usize) -> Self {
        Self {
            article_pdf: vec![None; articles],
            pdf_article: vec![None; pdfs],
            results: vec![None; articles],
            rejected: vec![false; pdfs],
            warnings: Vec::new(),
        }
    }

    pub(crate) fn article_free(&self, article: usize) -> bool {
        self.article_pdf[article].is_none()
    }

    pub(crate) fn pdf_free(&self, pdf: usize) -> bool {
        self.pdf_article[pdf].is_none()
    }

    /// Free and not excluded by a foreign DOI.
    pub(crate) fn pdf_eligible(&self, pdf: usize) -> bool {
        self.pdf_free(pdf) && !self.rejected[pdf]
    }

    pub(crate) fn reject(&mut self, pdf: usize) {
        self.rejected[pdf] = true;
    }

    pub(crate) fn matched_count(&self) -> usize {
        self.article_pdf.iter().filter(|p| p.is_some()).count()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assign(
        &mut self,
        article: &ArticleRecord,
        pdf_index: usize,
        pdf: &PdfCandidate,
        score: f64,
        method: MatchMethod,
        confidence: Confidence,
        components: Option<ComponentScores>,
        details: Vec<String>,
    ) {
        debug_assert!(self.article_free(article.index) && self.pdf_free(pdf_index));
        self.article_pdf[article.index] = Some(pdf_index);
        self.pdf_article[pdf_index] = Some(article.index);
        self.results[article.index] = Some(MatchResult {
            article_index: article.index,
            article_id: article.article_id.clone(),
            article_title: article.display_title().map(str::to_string),
            pdf_filename: Some(pdf.filename.clone()),
            score,
            method,
            confidence,
            doi: article.doi.clone(),
            edn: article.edn.clone(),
            reason: None,
            components,
            details,
        });
    }

    pub(crate) fn mark_unmatched(
        &mut self,
        article: &ArticleRecord,
        reason: UnmatchedReason,
        score: f64,
        details: Vec<String>,
    ) {
        self.results[article.index] = Some(MatchResult {
            article_index: article.index,
            article_id: article.article_id.clone(),
            article_title: article.display_title().map(str::to_string),
            pdf_filename: None,
            score,
            method: MatchMethod::Unmatched,
            confidence: Confidence::None,
            doi: article.doi.clone(),
            edn: article.edn.clone(),
            reason: Some(reason),
            components: None,
            details,
        });
    }
}

/// Runs every phase and returns the final assignment.
pub fn match_articles(
    articles: &[ArticleRecord],
    pdfs: &[PdfCandidate],
    config: &MatcherConfig,
) -> MatchOutcome {
    let mut state = MatchState::new(articles.len(), pdfs.len());

    identifier::match_by_edn(articles, pdfs, &mut state);
    let after_edn = state.matched_count();
    identifier::match_by_doi(articles, pdfs, &config.thresholds, &mut state);
    let after_doi = state.matched_count();
    info!(
        edn = after_edn,
        doi = after_doi - after_edn,
        rejected = state.rejected.iter().filter(|r| **r).count(),
        "identifier phases finished"
    );

    let thresholds = fuzzy::match_fuzzy(articles, pdfs, config, &mut state);
    info!(
        fuzzy = state.matched_count() - after_doi,
        unmatched = articles.len() - state.matched_count(),
        "fuzzy phase finished"
    );

    let MatchState {
        article_pdf,
        pdf_article,
        results,
        rejected,
        warnings,
    } = state;

    let assignments = article_pdf
        .iter()
        .enumerate()
        .filter_map(|(article_index, pdf)| {
            pdf.map(|pdf_index| Assignment {
                article_index,
                pdf_index,
            })
        })
        .collect();

    let results = results
        .into_iter()
        .zip(articles)
        .map(|(result, article)| {
            result.unwrap_or_else(|| MatchResult {
                article_index: article.index,
                article_id: article.article_id.clone(),
                article_title: article.display_title().map(str::to_string),
                pdf_filename: None,
                score: 0.0,
                method: MatchMethod::Unmatched,
                confidence: Confidence::None,
                doi: article.doi.clone(),
                edn: article.edn.clone(),
                reason: Some(UnmatchedReason::NoCandidate),
                components: None,
                details: Vec::new(),
            })
        })
        .collect();

    let pdfs = pdfs
        .iter()
        .enumerate()
        .map(|(index, pdf)| PdfDiagnostic {
            filename: pdf.filename.clone(),
            archive_path: pdf.archive_path.clone(),
            quality: pdf.metadata.extraction_quality,
            title: pdf.metadata.title.clone(),
            authors: pdf.metadata.authors.clone(),
            doi: pdf.metadata.doi.clone(),
            edn: pdf.metadata.edn.clone(),
            doi_candidates: pdf.metadata.doi_candidates.clone(),
            assigned_to: pdf_article[index],
            rejected_foreign_doi: rejected[index],
        })
        .collect();

    MatchOutcome {
        assignments,
        results,
        warnings,
        thresholds,
        pdfs,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::manifest::ManifestDocument;
    use crate::types::{LangPair, PageRange};

    pub fn article(index: usize, title: Option<&str>) -> ArticleRecord {
        let doc = ManifestDocument::parse("<a/>").unwrap();
        ArticleRecord {
            index,
            node: doc.root_element().unwrap(),
            article_id: Some(format!("art-{index}")),
            num: None,
            pages: None,
            titles: LangPair {
                ru: title.map(str::to_string),
                en: None,
            },
            author_surnames: LangPair::default(),
            doi: None,
            edn: None,
        }
    }

    pub fn with_pages(mut article: ArticleRecord, start: u32, end: u32) -> ArticleRecord {
        article.pages = Some(PageRange::new(start, end));
        article
    }

    pub fn pdf(filename: &str, metadata: PdfDocumentMetadata) -> PdfCandidate {
        PdfCandidate {
            filename: filename.to_string(),
            archive_path: format!("issue/{filename}"),
            metadata,
        }
    }

    pub fn titled(title: &str) -> PdfDocumentMetadata {
        PdfDocumentMetadata {
            title: Some(title.to_string()),
            ..PdfDocumentMetadata::default()
        }
        .with_computed_quality()
    }

    pub fn with_doi(doi: &str) -> PdfDocumentMetadata {
        PdfDocumentMetadata {
            doi: Some(doi.to_string()),
            ..PdfDocumentMetadata::default()
        }
        .with_computed_quality()
    }
}
