//! pdfmatch: reconciles journal-issue PDFs with their XML manifest.

pub mod bundle;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod manifest;
pub mod matching;
pub mod pdf;
pub mod reconcile;
pub mod report;
pub mod similarity;
pub mod types;

pub use bundle::{Bundle, PdfFile, extract_bundle, repack_bundle};
pub use config::MatcherConfig;
pub use error::{BundleError, MatchError, Result};
pub use manifest::{ArticleRecord, ManifestDocument};
pub use matching::{MatchOutcome, PdfCandidate, match_articles};
pub use pdf::{LopdfMetadataSource, PdfMetadataSource};
pub use reconcile::{Reconciler, Reconciliation, reconcile};
pub use report::{Confidence, MatchMethod, MatchReport, MatchResult, MatchWarning};
pub use types::{PageRange, PdfDocumentMetadata};
