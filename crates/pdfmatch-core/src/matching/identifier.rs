//! Exact identifier phases. An identifier shared by exactly one article and
//! one PDF pairs them regardless of any textual similarity.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::{MatchState, PdfCandidate};
use crate::config::Thresholds;
use crate::identifiers::{identifiers_partially_match, is_valid_doi};
use crate::manifest::ArticleRecord;
use crate::report::{Confidence, IdentifierKind, MatchMethod, MatchWarning};

/// Identifier value to the articles carrying it, in manifest order.
fn index_articles<'a>(
    articles: &'a [ArticleRecord],
    key: impl Fn(&'a ArticleRecord) -> Option<&'a str>,
) -> BTreeMap<&'a str, Vec<usize>> {
    let mut index: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for article in articles {
        if let Some(value) = key(article) {
            index.entry(value).or_default().push(article.index);
        }
    }
    index
}

fn warn_duplicates(
    index: &BTreeMap<&str, Vec<usize>>,
    identifier: IdentifierKind,
    state: &mut MatchState,
) {
    for (value, indices) in index.iter().filter(|(_, v)| v.len() > 1) {
        warn!(value = %value, articles = ?indices, "identifier shared by several articles");
        state.warnings.push(MatchWarning::DuplicateIdentifier {
            identifier,
            value: value.to_string(),
            article_indices: indices.clone(),
        });
    }
}

/// Phase 0: EDN equality.
pub(crate) fn match_by_edn(
    articles: &[ArticleRecord],
    pdfs: &[PdfCandidate],
    state: &mut MatchState,
) {
    let index = index_articles(articles, |a| a.edn.as_deref());
    warn_duplicates(&index, IdentifierKind::Edn, state);
    if index.is_empty() {
        return;
    }

    for (pdf_index, pdf) in pdfs.iter().enumerate() {
        let Some(edn) = pdf.metadata.edn.as_deref() else {
            continue;
        };
        let Some(hits) = index.get(edn) else {
            debug!(pdf = %pdf.filename, edn, "EDN not present in manifest");
            continue;
        };
        let [article_index] = hits.as_slice() else {
            continue;
        };
        if !state.article_free(*article_index) || !state.pdf_free(pdf_index) {
            continue;
        }

        let article = &articles[*article_index];
        info!(article = article.index, pdf = %pdf.filename, edn, "EDN match");
        state.assign(
            article,
            pdf_index,
            pdf,
            1.0,
            MatchMethod::EdnExact,
            Confidence::High,
            None,
            vec![format!("EDN {edn}")],
        );
    }
}

/// Phase 1: DOI equality, then a unique truncated-DOI prefix match. A PDF
/// whose long, well-formed DOI matches nothing is excluded from fuzzy
/// matching.
pub(crate) fn match_by_doi(
    articles: &[ArticleRecord],
    pdfs: &[PdfCandidate],
    thresholds: &Thresholds,
    state: &mut MatchState,
) {
    let index = index_articles(articles, |a| a.doi.as_deref());
    warn_duplicates(&index, IdentifierKind::Doi, state);

    for (pdf_index, pdf) in pdfs.iter().enumerate() {
        if !state.pdf_free(pdf_index) {
            continue;
        }
        let Some(doi) = pdf.metadata.doi.as_deref() else {
            continue;
        };

        if let Some(hits) = index.get(doi) {
            if let [article_index] = hits.as_slice() {
                if state.article_free(*article_index) {
                    let article = &articles[*article_index];
                    info!(article = article.index, pdf = %pdf.filename, doi, "DOI match");
                    state.assign(
                        article,
                        pdf_index,
                        pdf,
                        1.0,
                        MatchMethod::DoiExact,
                        Confidence::High,
                        None,
                        vec![format!("DOI {doi}")],
                    );
                }
            }
            continue;
        }

        let partial: Vec<(&str, usize)> = index
            .iter()
            .filter(|(article_doi, _)| identifiers_partially_match(doi, article_doi))
            .flat_map(|(article_doi, indices)| indices.iter().map(move |i| (*article_doi, *i)))
            .collect();

        match partial.as_slice() {
            [] => {
                if is_valid_doi(doi) && doi.chars().count() >= thresholds.long_doi_min_len {
                    warn!(pdf = %pdf.filename, doi, "DOI not in manifest, excluded from fuzzy matching");
                    state.reject(pdf_index);
                } else {
                    debug!(pdf = %pdf.filename, doi, "short DOI without match, left to fuzzy matching");
                }
            }
            [(article_doi, article_index)] => {
                if !state.article_free(*article_index) {
                    continue;
                }
                let article = &articles[*article_index];
                info!(
                    article = article.index,
                    pdf = %pdf.filename,
                    pdf_doi = doi,
                    manifest_doi = article_doi,
                    "partial DOI match"
                );
                state.assign(
                    article,
                    pdf_index,
                    pdf,
                    thresholds.doi_partial_score,
                    MatchMethod::DoiPartial,
                    Confidence::High,
                    None,
                    vec![format!("PDF DOI {doi} partially matches {article_doi}")],
                );
            }
            _ => {
                warn!(pdf = %pdf.filename, doi, hits = partial.len(), "DOI partially matches several articles");
                state.warnings.push(MatchWarning::AmbiguousPartialDoi {
                    pdf: pdf.filename.clone(),
                    doi: doi.to_string(),
                });
            }
        }
    }
}
