//! Generic document tree and its XML reader
//!
//! A [`Node`] is an element with attributes, optional text and ordered children.
//! The reader builds the tree with an explicit element stack so that deeply
//! nested input cannot exhaust the call stack.

use crate::error::{MeltError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

/// One element of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Direct text content, trimmed; `None` when blank
    pub text: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn element(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Node::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Text content if it holds anything besides whitespace
    pub fn value(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// All descendants (and self) with the given name, in document order
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Node> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.name == name {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// Parse a whole XML document held in memory
    pub fn parse_str(xml: &str) -> Result<Node> {
        Self::parse_reader(xml.as_bytes())
    }

    /// Parse an XML document and return its root element
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Node> {
        let mut reader = Reader::from_reader(reader);
        let mut buf = Vec::new();
        let mut open: Vec<(Node, String)> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    open.push((start_node(e)?, String::new()));
                }
                Ok(Event::Empty(ref e)) => {
                    let node = start_node(e)?;
                    attach(node, &mut open, &mut root)?;
                }
                Ok(Event::End(_)) => {
                    let (mut node, text) = open
                        .pop()
                        .ok_or_else(|| MeltError::Xml("unbalanced end tag".into()))?;
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        node.text = Some(trimmed.to_string());
                    }
                    attach(node, &mut open, &mut root)?;
                }
                Ok(Event::Text(ref t)) => {
                    if let Some((_, text)) = open.last_mut() {
                        let unescaped = t
                            .unescape()
                            .map_err(|e| MeltError::Xml(e.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Ok(Event::CData(ref c)) => {
                    if let Some((_, text)) = open.last_mut() {
                        text.push_str(&String::from_utf8_lossy(c));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(MeltError::Xml(format!(
                        "error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                // Declarations, comments, processing instructions, doctype
                _ => {}
            }
            buf.clear();
        }

        if !open.is_empty() {
            return Err(MeltError::Xml(format!(
                "document ended with {} unclosed element(s)",
                open.len()
            )));
        }
        root.ok_or_else(|| MeltError::Xml("document has no root element".into()))
    }
}

fn start_node(e: &BytesStart) -> Result<Node> {
    let mut node = Node::element(String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(|e| MeltError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| MeltError::Xml(e.to_string()))?
            .to_string();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(node: Node, open: &mut [(Node, String)], root: &mut Option<Node>) -> Result<()> {
    match open.last_mut() {
        Some((parent, _)) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(MeltError::Xml("multiple root elements".into())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_citation() {
        let xml = r#"<?xml version="1.0"?>
            <MedlineCitation Status="MEDLINE">
                <PMID Version="1">100</PMID>
                <Article>
                    <ArticleTitle>Salt &amp; pepper</ArticleTitle>
                    <Empty/>
                </Article>
            </MedlineCitation>"#;

        let root = Node::parse_str(xml).unwrap();
        assert_eq!(root.name, "MedlineCitation");
        assert_eq!(root.attribute("Status"), Some("MEDLINE"));
        assert_eq!(root.text, None);
        assert_eq!(root.children.len(), 2);

        let pmid = &root.children[0];
        assert_eq!(pmid.value(), Some("100"));
        assert_eq!(pmid.attribute("Version"), Some("1"));

        let article = &root.children[1];
        assert_eq!(article.children[0].value(), Some("Salt & pepper"));
        assert_eq!(article.children[1].name, "Empty");
    }

    #[test]
    fn test_mixed_content_concatenates_segments() {
        let root = Node::parse_str("<A>left <i>mid</i> right</A>").unwrap();
        assert_eq!(root.text.as_deref(), Some("left  right"));
        assert_eq!(root.children[0].value(), Some("mid"));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = Node::parse_str(
            "<Set><Cit><Id>1</Id></Cit><Other><Cit><Id>2</Id></Cit></Other><Cit><Id>3</Id></Cit></Set>",
        )
        .unwrap();
        let ids: Vec<_> = root
            .descendants_named("Cit")
            .into_iter()
            .map(|c| c.children[0].value().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_unclosed_element_is_error() {
        assert!(matches!(Node::parse_str("<A><B></B>"), Err(MeltError::Xml(_))));
    }
}
