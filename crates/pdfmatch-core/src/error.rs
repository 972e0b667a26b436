use std::path::PathBuf;

use thiserror::Error;

/// Problems with the uploaded bundle itself. Always fatal.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no XML manifest found in bundle {0}")]
    MissingManifest(PathBuf),

    #[error("no PDF files found in bundle {0}")]
    NoPdfFiles(PathBuf),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),
}

/// All errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("PDF extraction error: {0}")]
    PdfExtraction(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl MatchError {
    pub fn is_bundle_error(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }

    pub fn is_manifest_error(&self) -> bool {
        matches!(self, Self::ManifestParse(_))
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
