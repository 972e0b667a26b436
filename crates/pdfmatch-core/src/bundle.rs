//! Issue bundles: a ZIP archive holding one XML manifest and the article PDFs.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{BundleError, Result};
use crate::report::MatchWarning;

/// A PDF extracted from the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFile {
    pub disk_path: PathBuf,
    /// Path inside the archive, `/`-separated.
    pub archive_path: String,
}

impl PdfFile {
    /// Base name written into the manifest.
    pub fn filename(&self) -> &str {
        self.archive_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.archive_path)
    }
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub source: PathBuf,
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest_archive_path: String,
    /// Ordered case-insensitively by archive path, base names unique.
    pub pdfs: Vec<PdfFile>,
    /// PDFs whose base name repeats one in `pdfs`. Repacked, never matched.
    pub shadowed: Vec<PdfFile>,
    pub skipped: Vec<MatchWarning>,
}

impl Bundle {
    /// Display name of the source archive.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle".to_string())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_resource_fork(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "__MACOSX")
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("._"))
}

/// Unpacks `archive_path` under `extract_to` and classifies its entries.
pub fn extract_bundle(archive_path: &Path, extract_to: &Path) -> Result<Bundle> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| {
        BundleError::InvalidArchive(format!("{}: {e}", archive_path.display()))
    })?;
    fs::create_dir_all(extract_to)?;

    let mut manifest: Option<(PathBuf, String)> = None;
    let mut pdfs = Vec::new();
    let mut skipped = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %name, "skipping archive entry outside the extraction root");
            skipped.push(MatchWarning::SkippedEntry {
                entry: name,
                reason: "path escapes the extraction root".to_string(),
            });
            continue;
        };
        if entry.is_dir() || is_resource_fork(&relative) {
            continue;
        }

        let out_path = extract_to.join(&relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;

        if has_extension(&relative, "xml") {
            if manifest.is_none() {
                debug!(entry = %name, "manifest found");
                manifest = Some((out_path, name));
            } else {
                info!(entry = %name, "ignoring additional XML file");
                skipped.push(MatchWarning::SkippedEntry {
                    entry: name,
                    reason: "additional XML file; the first one is the manifest".to_string(),
                });
            }
        } else if has_extension(&relative, "pdf") {
            pdfs.push(PdfFile {
                disk_path: out_path,
                archive_path: name,
            });
        }
    }

    let Some((manifest_path, manifest_archive_path)) = manifest else {
        return Err(BundleError::MissingManifest(archive_path.to_path_buf()).into());
    };
    pdfs.sort_by_cached_key(|pdf| pdf.archive_path.to_lowercase());
    let (pdfs, shadowed) = split_shadowed(pdfs, &mut skipped);

    info!(
        bundle = %archive_path.display(),
        manifest = %manifest_archive_path,
        pdfs = pdfs.len(),
        "bundle extracted"
    );

    Ok(Bundle {
        source: archive_path.to_path_buf(),
        root: extract_to.to_path_buf(),
        manifest_path,
        manifest_archive_path,
        pdfs,
        shadowed,
        skipped,
    })
}

/// The manifest names PDFs by base name only, so the first file in archive
/// order claims each name and later ones are set aside with a warning.
fn split_shadowed(
    pdfs: Vec<PdfFile>,
    skipped: &mut Vec<MatchWarning>,
) -> (Vec<PdfFile>, Vec<PdfFile>) {
    let mut seen = HashSet::new();
    let (mut kept, mut shadowed) = (Vec::with_capacity(pdfs.len()), Vec::new());
    for pdf in pdfs {
        if seen.insert(pdf.filename().to_string()) {
            kept.push(pdf);
        } else {
            warn!(entry = %pdf.archive_path, "duplicate PDF file name");
            skipped.push(MatchWarning::SkippedEntry {
                entry: pdf.archive_path.clone(),
                reason: format!("another PDF is already named {}", pdf.filename()),
            });
            shadowed.push(pdf);
        }
    }
    (kept, shadowed)
}

/// Writes a new archive with the updated manifest and every PDF, each
/// under its original archive path.
pub fn repack_bundle(bundle: &Bundle, manifest_path: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(bundle.manifest_archive_path.as_str(), options)?;
    writer.write_all(&fs::read(manifest_path)?)?;
    for pdf in bundle.pdfs.iter().chain(&bundle.shadowed) {
        writer.start_file(pdf.archive_path.as_str(), options)?;
        writer.write_all(&fs::read(&pdf.disk_path)?)?;
    }
    writer.finish()?;

    info!(dest = %dest.display(), pdfs = bundle.pdfs.len(), "bundle repacked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn classifies_entries_and_sorts_pdfs() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("issue.zip");
        write_zip(
            &zip_path,
            &[
                ("issue/b.PDF", b"%PDF-b"),
                ("issue/manifest.XML", b"<issue/>"),
                ("issue/A.pdf", b"%PDF-a"),
                ("issue/extra.xml", b"<x/>"),
                ("__MACOSX/issue/._A.pdf", b"junk"),
                ("issue/readme.txt", b"hello"),
            ],
        );

        let bundle = extract_bundle(&zip_path, &dir.path().join("out")).unwrap();
        assert_eq!(bundle.manifest_archive_path, "issue/manifest.XML");
        assert!(bundle.manifest_path.exists());
        let names: Vec<&str> = bundle.pdfs.iter().map(|p| p.archive_path.as_str()).collect();
        assert_eq!(names, vec!["issue/A.pdf", "issue/b.PDF"]);
        assert_eq!(bundle.pdfs[0].filename(), "A.pdf");
        assert_eq!(bundle.skipped.len(), 1);
        assert_eq!(bundle.name(), "issue.zip");
        assert_eq!(bundle.stem(), "issue");
    }

    #[test]
    fn repeated_base_name_keeps_first_pdf() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("issue.zip");
        write_zip(
            &zip_path,
            &[
                ("issue/b/x.pdf", b"%PDF-b"),
                ("issue/manifest.xml", b"<issue/>"),
                ("issue/a/x.pdf", b"%PDF-a"),
                ("issue/y.pdf", b"%PDF-y"),
            ],
        );

        let bundle = extract_bundle(&zip_path, &dir.path().join("out")).unwrap();
        let names: Vec<&str> = bundle.pdfs.iter().map(|p| p.archive_path.as_str()).collect();
        assert_eq!(names, vec!["issue/a/x.pdf", "issue/y.pdf"]);
        assert_eq!(bundle.shadowed.len(), 1);
        assert_eq!(bundle.shadowed[0].archive_path, "issue/b/x.pdf");
        assert!(matches!(
            &bundle.skipped[..],
            [MatchWarning::SkippedEntry { entry, .. }] if entry == "issue/b/x.pdf"
        ));

        let dest = dir.path().join("repacked.zip");
        repack_bundle(&bundle, &bundle.manifest_path, &dest).unwrap();
        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut shadowed = String::new();
        archive
            .by_name("issue/b/x.pdf")
            .unwrap()
            .read_to_string(&mut shadowed)
            .unwrap();
        assert_eq!(shadowed, "%PDF-b");
    }

    #[test]
    fn missing_manifest_is_a_bundle_error() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("no_xml.zip");
        write_zip(&zip_path, &[("a.pdf", b"%PDF")]);
        let err = extract_bundle(&zip_path, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, MatchError::Bundle(BundleError::MissingManifest(_))));
    }

    #[test]
    fn non_zip_is_invalid_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.zip");
        fs::write(&path, b"not a zip").unwrap();
        let err = extract_bundle(&path, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, MatchError::Bundle(BundleError::InvalidArchive(_))));
    }

    #[test]
    fn repack_keeps_archive_paths() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("issue.zip");
        write_zip(&zip_path, &[("m/issue.xml", b"<issue/>"), ("pdf/a.pdf", b"%PDF-a")]);
        let bundle = extract_bundle(&zip_path, &dir.path().join("out")).unwrap();

        let updated = dir.path().join("updated.xml");
        fs::write(&updated, "<issue><files/></issue>").unwrap();
        let dest = dir.path().join("repacked.zip");
        repack_bundle(&bundle, &updated, &dest).unwrap();

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut manifest = String::new();
        archive
            .by_name("m/issue.xml")
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        assert_eq!(manifest, "<issue><files/></issue>");
        assert!(archive.by_name("pdf/a.pdf").is_ok());
    }
}
