//! End-to-end run over one bundle: extract, read, match, write back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bundle::{extract_bundle, repack_bundle};
use crate::config::MatcherConfig;
use crate::error::{BundleError, Result};
use crate::manifest::{ManifestDocument, cleanup_pdf_files, read_articles, set_pdf_file};
use crate::matching::{PdfCandidate, match_articles};
use crate::pdf::{LopdfMetadataSource, PdfMetadataSource, extract_or_degrade};
use crate::report::MatchReport;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub report: MatchReport,
    pub run_dir: PathBuf,
    /// The extracted manifest, updated in place.
    pub manifest_path: PathBuf,
    /// Copy of the updated manifest named after the bundle.
    pub processed_path: PathBuf,
    pub repacked_path: Option<PathBuf>,
}

pub struct Reconciler {
    config: MatcherConfig,
    pdf_source: Arc<dyn PdfMetadataSource>,
    repack_to: Option<PathBuf>,
}

impl Reconciler {
    pub fn new(config: MatcherConfig) -> Self {
        let pdf_source = Arc::new(LopdfMetadataSource::new(config.extraction.clone()));
        Self {
            config,
            pdf_source,
            repack_to: None,
        }
    }

    pub fn with_pdf_source(mut self, source: Arc<dyn PdfMetadataSource>) -> Self {
        self.pdf_source = source;
        self
    }

    /// Also write a new archive with the updated manifest to `dest`.
    pub fn with_repack(mut self, dest: impl Into<PathBuf>) -> Self {
        self.repack_to = Some(dest.into());
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Runs the whole pipeline with `work_dir` as the extraction directory.
    /// Fails before touching the manifest when the bundle itself is unusable.
    pub fn reconcile(&self, bundle_path: &Path, work_dir: &Path) -> Result<Reconciliation> {
        self.config.validate()?;
        let run_id = Uuid::now_v7().to_string();
        info!(run = %run_id, bundle = %bundle_path.display(), "reconciling bundle");

        let bundle = extract_bundle(bundle_path, work_dir)?;
        if bundle.pdfs.is_empty() {
            return Err(BundleError::NoPdfFiles(bundle_path.to_path_buf()).into());
        }

        let mut doc = ManifestDocument::load(&bundle.manifest_path)?;
        let articles = read_articles(&doc)?;
        info!(
            articles = articles.len(),
            with_doi = articles.iter().filter(|a| a.doi.is_some()).count(),
            with_edn = articles.iter().filter(|a| a.edn.is_some()).count(),
            "manifest read"
        );

        let cleanup_removed = if self.config.run.cleanup_existing {
            let removed = cleanup_pdf_files(&mut doc);
            if removed > 0 {
                info!(removed, "removed stale PDF references");
            }
            removed
        } else {
            0
        };

        let mut warnings = bundle.skipped.clone();
        let mut candidates = Vec::with_capacity(bundle.pdfs.len());
        for pdf in &bundle.pdfs {
            let filename = pdf.filename().to_string();
            let (metadata, warning) =
                extract_or_degrade(self.pdf_source.as_ref(), &pdf.disk_path, &filename);
            warnings.extend(warning);
            candidates.push(PdfCandidate {
                filename,
                archive_path: pdf.archive_path.clone(),
                metadata,
            });
        }

        let outcome = match_articles(&articles, &candidates, &self.config);
        for assignment in &outcome.assignments {
            set_pdf_file(
                &mut doc,
                articles[assignment.article_index].node,
                &candidates[assignment.pdf_index].filename,
            );
        }

        doc.save(&bundle.manifest_path)?;
        let processed_path = work_dir.join(format!("{}_processed.xml", bundle.stem()));
        doc.save(&processed_path)?;

        let repacked_path = match &self.repack_to {
            Some(dest) => {
                repack_bundle(&bundle, &bundle.manifest_path, dest)?;
                Some(dest.clone())
            }
            None => None,
        };

        warnings.extend(outcome.warnings);
        let mut report = MatchReport::new(
            run_id,
            bundle.name(),
            outcome.results,
            outcome.thresholds,
            self.config.weights,
        );
        report.cleanup_removed = cleanup_removed;
        report.warnings = warnings;
        report.pdfs = outcome.pdfs;

        if report.unmatched_articles > 0 {
            warn!(unmatched = report.unmatched_articles, "some articles have no PDF");
        }
        info!(
            matched = report.matched_articles,
            total = report.total_articles,
            output = %processed_path.display(),
            "reconciliation finished"
        );

        Ok(Reconciliation {
            report,
            run_dir: work_dir.to_path_buf(),
            manifest_path: bundle.manifest_path,
            processed_path,
            repacked_path,
        })
    }
}

/// A fresh, uniquely named run directory under `work_root`.
pub fn new_run_dir(work_root: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let id = Uuid::new_v4().simple().to_string();
    work_root.join(format!("{stamp}_{}_extract", &id[..8]))
}

/// Reconciles `bundle_path` with the user configuration in a fresh run
/// directory. Returns the processed manifest path and the report.
pub fn reconcile(bundle_path: &Path) -> Result<(PathBuf, MatchReport)> {
    let config = MatcherConfig::load()?;
    let run_dir = new_run_dir(&config.work_root());
    let outcome = Reconciler::new(config).reconcile(bundle_path, &run_dir)?;
    Ok((outcome.processed_path, outcome.report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dirs_are_unique_and_suffixed() {
        let root = Path::new("/tmp/pdfmatch");
        let a = new_run_dir(root);
        let b = new_run_dir(root);
        assert_ne!(a, b);
        assert!(a.starts_with(root));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_extract"), "{name}");
        assert_eq!(name.len(), "20250101_120000_abcdef12_extract".len());
    }

    #[test]
    fn invalid_config_fails_before_extraction() {
        let mut config = MatcherConfig::default();
        config.thresholds.min_score = 2.0;
        let dir = tempfile::TempDir::new().unwrap();
        let err = Reconciler::new(config)
            .reconcile(&dir.path().join("missing.zip"), &dir.path().join("run"))
            .unwrap_err();
        assert!(matches!(err, crate::error::MatchError::Config(_)));
        assert!(!dir.path().join("run").exists());
    }
}
