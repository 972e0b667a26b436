//! Arena-backed XML tree that round-trips untouched markup byte for byte.
//!
//! Nodes live in a flat table addressed by [`NodeId`]. Detaching a node
//! unlinks it from its parent but keeps its slot, so handles held by
//! article records stay valid for the lifetime of the document.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, BytesText, Event};
use regex::Regex;
use tracing::debug;

use crate::error::{MatchError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml\s[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap()
});

/// Encoding named by the XML declaration, if it is one that can also be
/// written back.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(512)];
    let end = head.windows(2).position(|w| w == b"?>")?;
    let declaration = std::str::from_utf8(&head[..end]).ok()?;
    let label = DECLARED_ENCODING.captures(declaration)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes()).filter(|e| e.output_encoding() == *e)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(BytesStart<'static>),
    /// Raw (still escaped) character data.
    Text(BytesText<'static>),
    /// Comments, CDATA, declarations, processing instructions, doctype.
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    self_closing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestDocument {
    nodes: Vec<Node>,
    top_level: Vec<NodeId>,
    bom: bool,
    /// Declared non-UTF-8 encoding the document was read with.
    encoding: Option<&'static Encoding>,
}

impl ManifestDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let (body, bom) = match xml.strip_prefix('\u{feff}') {
            Some(rest) => (rest, true),
            None => (xml, false),
        };

        let mut doc = Self {
            bom,
            ..Self::default()
        };
        let mut reader = Reader::from_str(body);
        let mut open: Vec<NodeId> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|err| {
                MatchError::ManifestParse(format!(
                    "malformed XML at byte {}: {err}",
                    reader.error_position()
                ))
            })?;
            let parent = open.last().copied();
            match event {
                Event::Eof => break,
                Event::Start(start) => {
                    let id = doc.push(NodeKind::Element(start.into_owned()), parent, false);
                    open.push(id);
                }
                Event::Empty(start) => {
                    doc.push(NodeKind::Element(start.into_owned()), parent, true);
                }
                Event::End(_) => {
                    if open.pop().is_none() {
                        return Err(MatchError::ManifestParse(
                            "closing tag without a matching opening tag".to_string(),
                        ));
                    }
                }
                Event::Text(text) => {
                    doc.push(NodeKind::Text(text.into_owned()), parent, false);
                }
                other => {
                    doc.push(NodeKind::Other(other.into_owned()), parent, false);
                }
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(MatchError::ManifestParse(format!(
                "unclosed element <{}>",
                doc.name(*unclosed).unwrap_or_default()
            )));
        }
        if doc.root_element().is_none() {
            return Err(MatchError::ManifestParse(
                "document has no root element".to_string(),
            ));
        }
        Ok(doc)
    }

    /// Decodes raw manifest bytes: UTF-8 (with or without BOM) or the
    /// single-byte encoding named in the XML declaration.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let has_bom = bytes.starts_with(UTF8_BOM);
        let body = if has_bom { &bytes[UTF8_BOM.len()..] } else { bytes };
        let encoding = if has_bom {
            UTF_8
        } else {
            declared_encoding(body).unwrap_or(UTF_8)
        };

        let text: Cow<'_, str> = if encoding == UTF_8 {
            Cow::Borrowed(std::str::from_utf8(body).map_err(|err| {
                MatchError::ManifestParse(format!("manifest is not valid UTF-8: {err}"))
            })?)
        } else {
            encoding
                .decode_without_bom_handling_and_without_replacement(body)
                .ok_or_else(|| {
                    MatchError::ManifestParse(format!(
                        "manifest is not valid {}",
                        encoding.name()
                    ))
                })?
        };

        let mut doc = Self::parse(&text)?;
        doc.bom = has_bom;
        if encoding != UTF_8 {
            debug!(encoding = encoding.name(), "decoded manifest");
            doc.encoding = Some(encoding);
        }
        Ok(doc)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
            .map_err(|err| match err {
                MatchError::ManifestParse(msg) => {
                    MatchError::ManifestParse(format!("{}: {msg}", path.display()))
                }
                other => other,
            })
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        for id in &self.top_level {
            self.write_node(&mut writer, *id)?;
        }
        let body = String::from_utf8(writer.into_inner()).map_err(|err| {
            MatchError::ManifestParse(format!("serialized manifest is not UTF-8: {err}"))
        })?;
        if self.bom {
            Ok(format!("\u{feff}{body}"))
        } else {
            Ok(body)
        }
    }

    /// The serialized document in the encoding it was read with.
    /// Characters the encoding cannot represent become character references.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let xml = self.to_xml_string()?;
        let Some(encoding) = self.encoding else {
            return Ok(xml.into_bytes());
        };
        let (bytes, _, unmappable) = encoding.encode(&xml);
        if unmappable {
            debug!(
                encoding = encoding.name(),
                "unmappable characters written as character references"
            );
        }
        Ok(bytes.into_owned())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Element(start) => {
                if node.self_closing && node.children.is_empty() {
                    write_event(writer, Event::Empty(start.clone()))?;
                } else {
                    write_event(writer, Event::Start(start.clone()))?;
                    for child in &node.children {
                        self.write_node(writer, *child)?;
                    }
                    write_event(writer, Event::End(start.to_end()))?;
                }
            }
            NodeKind::Text(text) => write_event(writer, Event::Text(text.clone()))?,
            NodeKind::Other(event) => write_event(writer, event.clone())?,
        }
        Ok(())
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>, self_closing: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            self_closing,
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.top_level.push(id),
        }
        id
    }

    // ─── Navigation ─────────────────────────────────────────

    pub fn has_bom(&self) -> bool {
        self.bom
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.unwrap_or(UTF_8).name()
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.top_level.iter().copied().find(|id| self.is_element(*id))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element(_))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Local element name, namespace prefix dropped.
    pub fn name(&self, id: NodeId) -> Option<String> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(start) => {
                Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned())
            }
            _ => None,
        }
    }

    fn has_name(&self, id: NodeId, name: &str) -> bool {
        match &self.nodes[id.0].kind {
            NodeKind::Element(start) => start.local_name().as_ref() == name.as_bytes(),
            _ => false,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.child_elements(id)
            .filter(move |child| self.has_name(*child, name))
    }

    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(id, name).next()
    }

    /// Follows a chain of direct children, taking the first match at each step.
    pub fn find_path(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter()
            .try_fold(id, |node, name| self.first_child_named(node, name))
    }

    /// Elements named `name` below `id` in document order. Matches are not
    /// searched for nested occurrences.
    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.has_name(node, name) {
                found.push(node);
                continue;
            }
            stack.extend(self.nodes[node.0].children.iter().rev().copied());
        }
        found
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        let NodeKind::Element(start) = &self.nodes[id.0].kind else {
            return None;
        };
        start
            .attributes()
            .with_checks(false)
            .filter_map(|attr| attr.ok())
            .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
            .map(|attr| match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            })
    }

    /// Concatenated, unescaped character data of the subtree.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Text(text) => {
                let raw = String::from_utf8_lossy(text);
                match quick_xml::escape::unescape(&raw) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(&raw),
                }
            }
            NodeKind::Other(Event::CData(data)) => out.push_str(&String::from_utf8_lossy(data)),
            NodeKind::Other(_) => {}
            NodeKind::Element(_) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    fn is_whitespace_text(&self, id: NodeId) -> bool {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => text.iter().all(|b| b.is_ascii_whitespace()),
            _ => false,
        }
    }

    fn raw_text(&self, id: NodeId) -> Option<String> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
            _ => None,
        }
    }

    // ─── Mutation ───────────────────────────────────────────

    /// Creates a detached element. `text` is escaped on output.
    pub fn create_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: Option<&str>,
    ) -> NodeId {
        let mut start = BytesStart::new(name.to_string());
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        let id = self.alloc(NodeKind::Element(start), text.is_none());
        if let Some(text) = text {
            let text_id = self.alloc(NodeKind::Text(BytesText::new(text).into_owned()), false);
            self.attach(id, text_id, None);
        }
        id
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        let text_id = self.alloc(NodeKind::Text(BytesText::new(text).into_owned()), false);
        self.attach(id, text_id, None);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child, None);
    }

    /// Unlinks `id` from its parent. The slot and its subtree stay addressable.
    pub fn detach(&mut self, id: NodeId) {
        match self.nodes[id.0].parent.take() {
            Some(parent) => self.nodes[parent.0].children.retain(|c| *c != id),
            None => self.top_level.retain(|c| *c != id),
        }
    }

    /// Detaches `id` together with the whitespace run that indents it.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            let siblings = &self.nodes[parent.0].children;
            if let Some(pos) = siblings.iter().position(|c| *c == id) {
                if pos > 0 && self.is_whitespace_text(siblings[pos - 1]) {
                    let indent = siblings[pos - 1];
                    self.detach(indent);
                }
            }
        }
        self.detach(id);
    }

    /// Appends `child` as the last element of `parent`, copying the
    /// indentation used by existing siblings (or derived from the parent's
    /// own indentation when it has none).
    pub fn append_element_indented(&mut self, parent: NodeId, child: NodeId) {
        let children = self.nodes[parent.0].children.clone();
        let sibling_indent = children
            .iter()
            .position(|c| self.is_element(*c))
            .filter(|pos| *pos > 0 && self.is_whitespace_text(children[pos - 1]))
            .and_then(|pos| self.raw_text(children[pos - 1]));
        let trailing_ws = children
            .last()
            .copied()
            .filter(|last| self.is_whitespace_text(*last));

        if let Some(indent) = sibling_indent {
            let ws = self.alloc_whitespace(&indent);
            let insert_at = match trailing_ws {
                Some(_) => Some(children.len() - 1),
                None => None,
            };
            self.attach(parent, ws, insert_at);
            self.attach(parent, child, insert_at.map(|i| i + 1));
            return;
        }

        let Some(parent_indent) = self.own_indent(parent) else {
            self.attach(parent, child, None);
            return;
        };
        if children.iter().any(|c| !self.is_whitespace_text(*c)) {
            self.attach(parent, child, None);
            return;
        }

        // Element without element children: lay out from scratch.
        for c in std::mem::take(&mut self.nodes[parent.0].children) {
            self.nodes[c.0].parent = None;
        }
        let unit = indent_unit(&parent_indent, self.parent(parent).and_then(|gp| self.own_indent(gp)));
        let open = self.alloc_whitespace(&format!("{parent_indent}{unit}"));
        let close = self.alloc_whitespace(&parent_indent);
        self.attach(parent, open, None);
        self.attach(parent, child, None);
        self.attach(parent, close, None);
    }

    /// Whitespace text immediately preceding `id` when it starts a new line.
    fn own_indent(&self, id: NodeId) -> Option<String> {
        let siblings = match self.parent(id) {
            Some(parent) => &self.nodes[parent.0].children,
            None => &self.top_level,
        };
        let pos = siblings.iter().position(|c| *c == id)?;
        if pos == 0 {
            return None;
        }
        let prev = siblings[pos - 1];
        if !self.is_whitespace_text(prev) {
            return None;
        }
        self.raw_text(prev)
            .filter(|ws| ws.contains('\n'))
            .map(|ws| format!("\n{}", ws.rsplit('\n').next().unwrap_or_default()))
    }

    fn alloc(&mut self, kind: NodeKind, self_closing: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            self_closing,
        });
        id
    }

    fn alloc_whitespace(&mut self, ws: &str) -> NodeId {
        self.alloc(NodeKind::Text(BytesText::from_escaped(ws.to_string())), false)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        if self.nodes[child.0].parent.is_some() {
            self.detach(child);
        }
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match at {
            Some(index) if index <= children.len() => children.insert(index, child),
            _ => children.push(child),
        }
    }
}

/// Indentation step inferred from two nested indents, two spaces by default.
fn indent_unit(inner: &str, outer: Option<String>) -> String {
    if let Some(outer) = outer {
        if let Some(step) = inner.strip_prefix(outer.as_str()) {
            if !step.is_empty() {
                return step.to_string();
            }
        }
    }
    if inner.ends_with('\t') {
        "\t".to_string()
    } else {
        "  ".to_string()
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|err| MatchError::ManifestParse(format!("failed to serialize manifest: {err}")))
}
