//! The issue manifest: parsing, article records and file-reference edits.

pub mod dom;
pub mod reader;
pub mod writer;

pub use dom::{ManifestDocument, NodeId};
pub use reader::{ArticleRecord, read_articles};
pub use writer::{cleanup_pdf_files, pdf_file, set_pdf_file};
