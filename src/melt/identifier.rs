use crate::config::MeltConfig;
use crate::document::Node;
use crate::error::{MeltError, Result};
use crate::melt::DocumentKey;

/// Find the document's natural id by depth-first search for the id element.
///
/// The first id element found in document order wins; its text is the id and
/// its version attribute the version. Both must be present.
pub fn find_document_key(document: &Node, config: &MeltConfig) -> Result<DocumentKey> {
    let mut stack: Vec<&Node> = document.children.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.name == config.id_element {
            return key_of(node, config);
        }
        stack.extend(node.children.iter().rev());
    }
    Err(missing(config))
}

/// Key carried by one id element
pub fn key_of(id_node: &Node, config: &MeltConfig) -> Result<DocumentKey> {
    match (id_node.value(), id_node.attribute(&config.version_attribute)) {
        (Some(id), Some(version)) => Ok(DocumentKey {
            id: id.trim().to_string(),
            version: version.trim().to_string(),
        }),
        _ => Err(missing(config)),
    }
}

fn missing(config: &MeltConfig) -> MeltError {
    MeltError::MissingIdentifier {
        element: config.id_element.clone(),
        attribute: config.version_attribute.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_in_document_order() {
        let doc = Node::element("MedlineCitation")
            .with_child(
                Node::element("Wrapper")
                    .with_child(Node::element("PMID").with_attr("Version", "2").with_text("17")),
            )
            .with_child(Node::element("PMID").with_attr("Version", "1").with_text("99"));

        let key = find_document_key(&doc, &MeltConfig::default()).unwrap();
        assert_eq!(key, DocumentKey { id: "17".into(), version: "2".into() });
    }

    #[test]
    fn test_missing_version_is_error() {
        let doc = Node::element("MedlineCitation").with_child(Node::element("PMID").with_text("5"));
        let err = find_document_key(&doc, &MeltConfig::default()).unwrap_err();
        assert!(matches!(err, MeltError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_missing_id_is_error() {
        let doc = Node::element("MedlineCitation").with_child(Node::element("Article"));
        assert!(find_document_key(&doc, &MeltConfig::default()).is_err());
    }
}
