use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lopdf::Document;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::{MatchError, Result};

/// Text of the leading pages and how many pages it covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub text: String,
    pub pages_read: usize,
}

/// Reads the first `pages_to_read` pages with lopdf, falling back to
/// `pdftotext` when lopdf fails or finds no text.
pub fn read_leading_pages(pdf_path: &Path, config: &ExtractionConfig) -> Result<PageText> {
    let lopdf_failure = match lopdf_pages(pdf_path, config.pages_to_read) {
        Ok(pages) if has_text(&pages.text) => return Ok(pages),
        Ok(_) => "lopdf found no text".to_string(),
        Err(err) => err.to_string(),
    };
    if !config.pdftotext_fallback {
        return Err(MatchError::PdfExtraction(lopdf_failure));
    }

    debug!(pdf = %pdf_path.display(), reason = %lopdf_failure, "falling back to pdftotext");
    let timeout = Duration::from_secs(config.pdftotext_timeout_secs);
    let text = pdftotext_pages(pdf_path, config.pages_to_read, timeout)
        .map_err(|err| MatchError::PdfExtraction(format!("{lopdf_failure}; {err}")))?;
    if !has_text(&text) {
        return Err(MatchError::PdfExtraction(format!(
            "{lopdf_failure}; pdftotext found no text"
        )));
    }
    Ok(PageText {
        text,
        pages_read: config.pages_to_read,
    })
}

fn has_text(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// Page by page, so one broken content stream does not hide the others.
fn lopdf_pages(pdf_path: &Path, count: usize) -> Result<PageText> {
    let mut page_text = PageText::default();
    if count == 0 {
        return Ok(page_text);
    }

    let document = Document::load(pdf_path)
        .map_err(|err| MatchError::PdfExtraction(format!("lopdf cannot open the file: {err}")))?;
    for page in document.get_pages().into_keys().take(count) {
        match document.extract_text(&[page]) {
            Ok(text) => {
                page_text.text.push_str(&text);
                if !text.ends_with('\n') {
                    page_text.text.push('\n');
                }
                page_text.pages_read += 1;
            }
            Err(err) => debug!(pdf = %pdf_path.display(), page, error = %err, "page text skipped"),
        }
    }
    Ok(page_text)
}

/// Runs `pdftotext` over pages `1..=count`, reading its stdout. The child
/// is killed once `timeout` passes.
fn pdftotext_pages(pdf_path: &Path, count: usize, timeout: Duration) -> Result<String> {
    let mut child = Command::new("pdftotext")
        .args(["-q", "-enc", "UTF-8", "-f", "1", "-l"])
        .arg(count.max(1).to_string())
        .arg(pdf_path)
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                MatchError::PdfExtraction("pdftotext is not installed".to_string())
            }
            _ => MatchError::PdfExtraction(format!("failed to run pdftotext: {err}")),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let waited = wait_with_deadline(&mut child, timeout);
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    let status = waited?;
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(MatchError::PdfExtraction(match stderr.trim() {
            "" => format!("pdftotext exited with {status}"),
            message => format!("pdftotext failed: {message}"),
        }));
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(25)),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MatchError::PdfExtraction(format!(
                    "pdftotext timed out after {}s",
                    timeout.as_secs()
                )));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MatchError::PdfExtraction(format!("waiting for pdftotext: {err}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};
    use tempfile::TempDir;

    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn garbage_file_is_an_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let config = ExtractionConfig {
            pdftotext_fallback: false,
            ..ExtractionConfig::default()
        };
        let err = read_leading_pages(&path, &config).unwrap_err();
        assert!(matches!(err, MatchError::PdfExtraction(_)));
    }

    #[test]
    fn zero_pages_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let page_text = lopdf_pages(&dir.path().join("missing.pdf"), 0).unwrap();
        assert_eq!(page_text, PageText::default());
    }

    #[test]
    fn only_leading_pages_are_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issue.pdf");
        write_pdf(&path, &["First page", "Second page", "Third page"]);

        let page_text = lopdf_pages(&path, 2).unwrap();
        assert_eq!(page_text.pages_read, 2);
        assert!(page_text.text.contains("First"), "{:?}", page_text.text);
        assert!(page_text.text.contains("Second"), "{:?}", page_text.text);
        assert!(!page_text.text.contains("Third"));
    }

    #[test]
    fn pdftotext_failure_leaves_no_files_behind() {
        let dir = TempDir::new().unwrap();
        let err = pdftotext_pages(&dir.path().join("missing.pdf"), 1, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, MatchError::PdfExtraction(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn whitespace_only_text_does_not_count() {
        assert!(!has_text(" \n\t"));
        assert!(has_text("\n a"));
    }
}
