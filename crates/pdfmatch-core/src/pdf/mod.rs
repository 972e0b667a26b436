//! Metadata recovery from PDF files: embedded document info first, then
//! heuristics over the text of the leading pages.

pub mod heuristics;
pub mod text;

use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::{MatchError, Result};
use crate::identifiers::{extract_doi_candidates, extract_edn};
use crate::report::MatchWarning;
use crate::types::{FieldSource, PdfDocumentMetadata};

pub use text::{PageText, read_leading_pages};

/// Source of per-PDF metadata. The default reads real files with lopdf;
/// tests substitute fixtures.
pub trait PdfMetadataSource: Send + Sync {
    fn extract(&self, pdf_path: &Path) -> Result<PdfDocumentMetadata>;
}

/// Embedded `/Title` and `/Author` values exactly as stored in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedFields {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LopdfMetadataSource {
    config: ExtractionConfig,
}

impl LopdfMetadataSource {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }
}

impl PdfMetadataSource for LopdfMetadataSource {
    fn extract(&self, pdf_path: &Path) -> Result<PdfDocumentMetadata> {
        let mut metadata_error = None;
        let embedded = match Document::load_metadata(pdf_path) {
            Ok(value) => Some(EmbeddedFields {
                title: value.title,
                author: value.author,
            }),
            Err(err) => {
                metadata_error = Some(err.to_string());
                None
            }
        };

        let mut text_error = None;
        let page_text = match read_leading_pages(pdf_path, &self.config) {
            Ok(value) => Some(value),
            Err(err) => {
                text_error = Some(err.to_string());
                None
            }
        };

        if embedded.is_none() && page_text.is_none() {
            let metadata_msg =
                metadata_error.unwrap_or_else(|| "failed to read PDF metadata".to_string());
            let text_msg = text_error.unwrap_or_else(|| "failed to extract page text".to_string());
            return Err(MatchError::PdfExtraction(format!("{metadata_msg}; {text_msg}")));
        }
        if let Some(err) = text_error {
            debug!(pdf = %pdf_path.display(), error = %err, "page text unavailable");
        }

        Ok(build_metadata(
            &embedded.unwrap_or_default(),
            &page_text.unwrap_or_default(),
            &self.config,
        ))
    }
}

/// Combines embedded fields with text heuristics into the final record.
pub fn build_metadata(
    embedded: &EmbeddedFields,
    page_text: &PageText,
    config: &ExtractionConfig,
) -> PdfDocumentMetadata {
    let mut meta = PdfDocumentMetadata {
        pages_read: page_text.pages_read,
        ..PdfDocumentMetadata::default()
    };

    if let Some(title) = embedded
        .title
        .as_deref()
        .and_then(|raw| heuristics::accept_embedded_title(raw, config))
    {
        meta.title = Some(title);
        meta.title_source = Some(FieldSource::Embedded);
    }

    let embedded_authors = embedded
        .author
        .as_deref()
        .map(|raw| heuristics::filter_embedded_authors(raw, config))
        .unwrap_or_default();
    if !embedded_authors.is_empty() {
        meta.authors = embedded_authors;
        meta.authors_source = Some(FieldSource::Embedded);
    }

    if !page_text.text.trim().is_empty() {
        let scan = extract_doi_candidates(&page_text.text);
        meta.doi = scan.primary;
        meta.doi_candidates = scan.candidates;
        meta.edn = extract_edn(&page_text.text);

        let lines = heuristics::text_lines(&page_text.text);
        let text_title = heuristics::extract_title(&lines);
        let title_end = text_title.as_ref().map(|t| t.last_line);
        if meta.title.is_none() {
            if let Some(candidate) = text_title {
                let len = candidate.text.chars().count();
                if (config.title_min_chars..=config.title_max_chars).contains(&len) {
                    meta.title = Some(candidate.text);
                    meta.title_source = Some(FieldSource::Text);
                }
            }
        }

        let text_authors = heuristics::extract_authors(&lines, title_end, config.max_authors);
        if text_authors.len() > meta.authors.len() {
            meta.authors = text_authors;
            meta.authors_source = Some(FieldSource::Text);
        }
    }

    meta.with_computed_quality()
}

/// Never fails: an unreadable PDF becomes empty metadata plus a warning.
pub fn extract_or_degrade(
    source: &dyn PdfMetadataSource,
    pdf_path: &Path,
    display_name: &str,
) -> (PdfDocumentMetadata, Option<MatchWarning>) {
    match source.extract(pdf_path) {
        Ok(meta) => {
            debug!(
                pdf = %display_name,
                quality = meta.extraction_quality.as_str(),
                doi = ?meta.doi,
                edn = ?meta.edn,
                title = ?meta.title,
                authors = meta.authors.len(),
                "extracted PDF metadata"
            );
            (meta, None)
        }
        Err(err) => {
            warn!(pdf = %display_name, error = %err, "PDF unreadable, continuing without metadata");
            let warning = MatchWarning::Extraction {
                pdf: display_name.to_string(),
                message: err.to_string(),
            };
            (PdfDocumentMetadata::unreadable(), Some(warning))
        }
    }
}
