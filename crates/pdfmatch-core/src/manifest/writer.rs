use crate::manifest::dom::{ManifestDocument, NodeId};

const PDF_DESC: &str = "PDF";

fn is_pdf_entry(doc: &ManifestDocument, file: NodeId) -> bool {
    doc.attribute(file, "desc")
        .is_some_and(|desc| desc.trim().eq_ignore_ascii_case(PDF_DESC))
}

fn pdf_entries(doc: &ManifestDocument, files: NodeId) -> Vec<NodeId> {
    doc.children_named(files, "file")
        .filter(|file| is_pdf_entry(doc, *file))
        .collect()
}

/// Sets the article's single `files/file[@desc=PDF]` to `filename`,
/// creating the elements when absent and dropping duplicates left by
/// earlier runs.
pub fn set_pdf_file(doc: &mut ManifestDocument, article: NodeId, filename: &str) {
    let files = match doc.first_child_named(article, "files") {
        Some(files) => files,
        None => {
            let files = doc.create_element("files", &[], None);
            doc.append_element_indented(article, files);
            files
        }
    };

    let mut existing = pdf_entries(doc, files).into_iter();
    match existing.next() {
        Some(first) => {
            doc.set_text(first, filename);
            for duplicate in existing {
                doc.remove(duplicate);
            }
        }
        None => {
            let file = doc.create_element("file", &[("desc", PDF_DESC)], Some(filename));
            doc.append_element_indented(files, file);
        }
    }
}

/// Removes every PDF file reference from every article. A `files`
/// container left without elements is removed as well.
pub fn cleanup_pdf_files(doc: &mut ManifestDocument) -> usize {
    let Some(root) = doc.root_element() else {
        return 0;
    };
    let articles = if doc.name(root).as_deref() == Some("article") {
        vec![root]
    } else {
        doc.descendants_named(root, "article")
    };

    let mut removed = 0;
    for article in articles {
        let containers: Vec<NodeId> = doc.children_named(article, "files").collect();
        for files in containers {
            for file in pdf_entries(doc, files) {
                doc.remove(file);
                removed += 1;
            }
            if doc.child_elements(files).next().is_none() {
                doc.remove(files);
            }
        }
    }
    removed
}

/// The PDF file name currently referenced by an article, if any.
pub fn pdf_file(doc: &ManifestDocument, article: NodeId) -> Option<String> {
    let files = doc.first_child_named(article, "files")?;
    pdf_entries(doc, files)
        .first()
        .map(|file| doc.text(*file).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "<issue>
  <article id=\"1\">
    <pages>1-5</pages>
  </article>
  <article id=\"2\">
    <files>
      <file desc=\"pdf\">old.pdf</file>
      <file desc=\"PDF\">older.pdf</file>
      <file desc=\"DOCX\">source.docx</file>
    </files>
  </article>
</issue>";

    fn setup() -> (ManifestDocument, Vec<NodeId>) {
        let doc = ManifestDocument::parse(ARTICLE).unwrap();
        let root = doc.root_element().unwrap();
        let articles = doc.descendants_named(root, "article");
        (doc, articles)
    }

    #[test]
    fn creates_files_with_indentation() {
        let (mut doc, articles) = setup();
        set_pdf_file(&mut doc, articles[0], "a.pdf");
        let xml = doc.to_xml_string().unwrap();
        assert!(
            xml.contains(
                "    <pages>1-5</pages>\n    <files>\n      <file desc=\"PDF\">a.pdf</file>\n    </files>\n  </article>"
            ),
            "{xml}"
        );
        assert_eq!(pdf_file(&doc, articles[0]).as_deref(), Some("a.pdf"));
    }

    #[test]
    fn writing_twice_keeps_one_entry() {
        let (mut doc, articles) = setup();
        set_pdf_file(&mut doc, articles[0], "a.pdf");
        let once = doc.to_xml_string().unwrap();
        set_pdf_file(&mut doc, articles[0], "a.pdf");
        assert_eq!(doc.to_xml_string().unwrap(), once);
        assert_eq!(once.matches("desc=\"PDF\"").count(), 2);
    }

    #[test]
    fn replaces_and_deduplicates_existing_entries() {
        let (mut doc, articles) = setup();
        set_pdf_file(&mut doc, articles[1], "new.pdf");
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains("<file desc=\"pdf\">new.pdf</file>"), "{xml}");
        assert!(!xml.contains("older.pdf"));
        assert!(xml.contains("source.docx"));
    }

    #[test]
    fn cleanup_counts_and_keeps_other_files() {
        let (mut doc, articles) = setup();
        set_pdf_file(&mut doc, articles[0], "a.pdf");
        let removed = cleanup_pdf_files(&mut doc);
        assert_eq!(removed, 3);
        let xml = doc.to_xml_string().unwrap();
        assert!(!xml.contains(".pdf"));
        assert!(xml.contains("source.docx"));
        assert_eq!(doc.first_child_named(articles[0], "files"), None);
        assert_eq!(pdf_file(&doc, articles[1]), None);
    }

    #[test]
    fn cleanup_then_write_is_stable_across_runs() {
        let (mut doc, articles) = setup();
        set_pdf_file(&mut doc, articles[0], "a.pdf");
        let first = doc.to_xml_string().unwrap();

        let mut again = ManifestDocument::parse(&first).unwrap();
        let root = again.root_element().unwrap();
        let nodes = again.descendants_named(root, "article");
        cleanup_pdf_files(&mut again);
        set_pdf_file(&mut again, nodes[0], "a.pdf");
        let xml = again.to_xml_string().unwrap();
        assert!(xml.contains(
            "    <pages>1-5</pages>\n    <files>\n      <file desc=\"PDF\">a.pdf</file>\n    </files>\n  </article>"
        ), "{xml}");
        assert_eq!(xml.matches("a.pdf").count(), 1);
    }
}
