use serde::Serialize;

use crate::error::{MatchError, Result};
use crate::identifiers::{normalize_doi, normalize_edn};
use crate::manifest::dom::{ManifestDocument, NodeId};
use crate::types::{Lang, LangPair, PageRange};

/// One `article` element of the manifest with its identifying fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub index: usize,
    #[serde(skip)]
    pub node: NodeId,
    pub article_id: Option<String>,
    pub num: Option<String>,
    pub pages: Option<PageRange>,
    pub titles: LangPair<Option<String>>,
    pub author_surnames: LangPair<Vec<String>>,
    pub doi: Option<String>,
    pub edn: Option<String>,
}

impl ArticleRecord {
    pub fn has_title(&self) -> bool {
        self.titles.ru.is_some() || self.titles.en.is_some()
    }

    pub fn has_surnames(&self) -> bool {
        !self.author_surnames.ru.is_empty() || !self.author_surnames.en.is_empty()
    }

    /// Preferred title for display: Russian first, then English.
    pub fn display_title(&self) -> Option<&str> {
        self.titles.ru.as_deref().or(self.titles.en.as_deref())
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.titles.both().into_iter().filter_map(|t| t.as_deref())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Reads every `article` element in document order.
pub fn read_articles(doc: &ManifestDocument) -> Result<Vec<ArticleRecord>> {
    let root = doc
        .root_element()
        .ok_or_else(|| MatchError::ManifestParse("document has no root element".to_string()))?;

    let nodes = if doc.name(root).as_deref() == Some("article") {
        vec![root]
    } else {
        doc.descendants_named(root, "article")
    };
    if nodes.is_empty() {
        return Err(MatchError::ManifestParse(
            "manifest contains no article elements".to_string(),
        ));
    }

    Ok(nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| read_article(doc, node, index))
        .collect())
}

pub fn read_article(doc: &ManifestDocument, node: NodeId, index: usize) -> ArticleRecord {
    let pages = doc
        .first_child_named(node, "pages")
        .and_then(|p| PageRange::parse(&doc.text(p)));

    let mut titles: LangPair<Option<String>> = LangPair::default();
    if let Some(container) = doc.first_child_named(node, "artTitles") {
        for title in doc.children_named(container, "artTitle") {
            let Some(lang) = doc.attribute(title, "lang").and_then(|l| Lang::from_attr(&l)) else {
                continue;
            };
            let slot = titles.get_mut(lang);
            if slot.is_none() {
                *slot = non_empty(collapse_whitespace(&doc.text(title)));
            }
        }
    }

    let mut author_surnames: LangPair<Vec<String>> = LangPair::default();
    if let Some(authors) = doc.first_child_named(node, "authors") {
        for author in doc.children_named(authors, "author") {
            for info in doc.children_named(author, "individInfo") {
                let Some(lang) = doc.attribute(info, "lang").and_then(|l| Lang::from_attr(&l)) else {
                    continue;
                };
                let surname = doc
                    .first_child_named(info, "surname")
                    .map(|s| collapse_whitespace(&doc.text(s)))
                    .and_then(non_empty);
                if let Some(surname) = surname {
                    author_surnames.get_mut(lang).push(surname);
                }
            }
        }
    }

    let doi = doc
        .find_path(node, &["codes", "doi"])
        .map(|d| normalize_doi(&doc.text(d)))
        .and_then(non_empty);
    let edn = doc
        .find_path(node, &["codes", "edn"])
        .and_then(|e| normalize_edn(&doc.text(e)));

    ArticleRecord {
        index,
        node,
        article_id: doc.attribute(node, "id"),
        num: doc.attribute(node, "num"),
        pages,
        titles,
        author_surnames,
        doi,
        edn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<journal>
  <issue>
    <articles>
      <article id="101" num="1">
        <pages>стр. 12–20</pages>
        <artTitles>
          <artTitle lang="RUS">  Экология рек
            бассейна Волги </artTitle>
          <artTitle lang="RUS">Второе название</artTitle>
          <artTitle lang="eng">Ecology of the Volga basin rivers</artTitle>
        </artTitles>
        <authors>
          <author num="1">
            <individInfo lang="RUS"><surname>Иванов</surname></individInfo>
            <individInfo lang="ENG"><surname>Ivanov</surname></individInfo>
          </author>
          <author num="2">
            <individInfo lang="RUS"><surname>Петров</surname></individInfo>
            <individInfo lang="ENG"><surname> </surname></individInfo>
          </author>
        </authors>
        <codes><doi>https://doi.org/10.31854/ABC.2023.1</doi><edn>AB-12</edn></codes>
        <references>
          <reference><doi>10.9999/foreign</doi></reference>
        </references>
      </article>
      <article id="102">
        <pages>33</pages>
        <references><codes><doi>10.9999/not-this-one</doi></codes></references>
      </article>
    </articles>
  </issue>
</journal>"#;

    fn articles() -> Vec<ArticleRecord> {
        let doc = ManifestDocument::parse(ISSUE).unwrap();
        read_articles(&doc).unwrap()
    }

    #[test]
    fn reads_articles_in_document_order() {
        let articles = articles();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].index, 0);
        assert_eq!(articles[0].article_id.as_deref(), Some("101"));
        assert_eq!(articles[0].num.as_deref(), Some("1"));
        assert_eq!(articles[1].index, 1);
        assert_eq!(articles[1].num, None);
    }

    #[test]
    fn first_non_empty_title_per_language_wins() {
        let articles = articles();
        let article = &articles[0];
        assert_eq!(article.titles.ru.as_deref(), Some("Экология рек бассейна Волги"));
        assert_eq!(article.titles.en.as_deref(), Some("Ecology of the Volga basin rivers"));
        assert_eq!(article.display_title(), Some("Экология рек бассейна Волги"));
        assert_eq!(article.titles().count(), 2);
    }

    #[test]
    fn surnames_accumulate_and_skip_blank() {
        let articles = articles();
        let article = &articles[0];
        assert_eq!(article.author_surnames.ru, vec!["Иванов", "Петров"]);
        assert_eq!(article.author_surnames.en, vec!["Ivanov"]);
    }

    #[test]
    fn identifiers_come_only_from_own_codes() {
        let articles = articles();
        assert_eq!(articles[0].doi.as_deref(), Some("10.31854/abc.2023.1"));
        assert_eq!(articles[0].edn, None);
        assert_eq!(articles[1].doi, None);
    }

    #[test]
    fn pages_are_parsed() {
        let articles = articles();
        assert_eq!(articles[0].pages, Some(PageRange::new(12, 20)));
        assert_eq!(articles[1].pages, Some(PageRange::new(33, 33)));
    }

    #[test]
    fn valid_edn_is_normalized() {
        let doc = ManifestDocument::parse(
            "<issue><article><codes><edn> edn: abc12f </edn></codes></article></issue>",
        )
        .unwrap();
        let articles = read_articles(&doc).unwrap();
        assert_eq!(articles[0].edn.as_deref(), Some("ABC12F"));
    }

    #[test]
    fn manifest_without_articles_is_an_error() {
        let doc = ManifestDocument::parse("<journal><issue/></journal>").unwrap();
        let err = read_articles(&doc).unwrap_err();
        assert!(matches!(err, MatchError::ManifestParse(_)));
    }
}
