//! Schema-guided decomposition of documents into keyed rows
//!
//! The decomposer applies the same table-boundary rule as inference, but against
//! a fixed [`TableLayout`]: no table is ever created here. Each table instance is
//! finalized once its subtree is done, so rows come out in post-order.

use crate::config::MeltConfig;
use crate::document::Node;
use crate::error::{MeltError, Result};
use crate::melt::identifier::find_document_key;
use crate::melt::{Decomposition, Row, SchemaDrift};
use crate::schema::{infer_schema, Schema, TableLayout};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// An open table instance while its subtree is walked
#[derive(Debug, Default)]
struct Instance {
    table: String,
    values: BTreeMap<String, String>,
    keys: BTreeMap<String, String>,
}

enum Step<'a> {
    Visit {
        node: &'a Node,
        name: String,
        instance: usize,
    },
    Close(usize),
}

/// Splits documents into rows for a fixed set of tables
#[derive(Debug, Clone)]
pub struct RecordDecomposer {
    layout: TableLayout,
    config: MeltConfig,
}

impl RecordDecomposer {
    pub fn new(layout: TableLayout, config: MeltConfig) -> Self {
        RecordDecomposer { layout, config }
    }

    pub fn from_schema(schema: &Schema, config: MeltConfig) -> Self {
        Self::new(schema.layout(), config)
    }

    /// Infer a schema from sample documents and decompose against it
    ///
    /// # Example
    /// ```rust
    /// use medmelt::{MeltConfig, Node, RecordDecomposer};
    ///
    /// let doc = Node::element("MedlineCitation")
    ///     .with_child(Node::element("PMID").with_attr("Version", "1").with_text("7"))
    ///     .with_child(Node::element("Keyword").with_text("heart"))
    ///     .with_child(Node::element("Keyword").with_text("lung"));
    ///
    /// let decomposer = RecordDecomposer::from_documents(&[doc.clone()], MeltConfig::default());
    /// let rows = decomposer.decompose(&doc).unwrap().rows;
    /// assert_eq!(rows.len(), 3);
    /// ```
    pub fn from_documents(documents: &[Node], config: MeltConfig) -> Self {
        let schema = infer_schema(documents, config.clone());
        Self::from_schema(&schema, config)
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn config(&self) -> &MeltConfig {
        &self.config
    }

    /// Decompose one root-table element into rows
    pub fn decompose(&self, document: &Node) -> Result<Decomposition> {
        let key = find_document_key(document, &self.config)?;
        let root = self.config.root_table.clone();
        if !self.layout.contains_table(&root) {
            return Err(MeltError::UnknownTableBoundary { table: root });
        }

        let mut root_keys = BTreeMap::new();
        root_keys.insert(self.config.id_column().to_string(), key.id.clone());
        root_keys.insert(self.config.version_column(), key.version.clone());

        let mut instances = vec![Instance {
            table: root,
            values: BTreeMap::new(),
            keys: root_keys,
        }];
        let mut stack = vec![
            Step::Close(0),
            Step::Visit {
                node: document,
                name: String::new(),
                instance: 0,
            },
        ];
        let mut rows = Vec::new();
        let mut drift = Vec::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit {
                    node,
                    name,
                    instance,
                } => {
                    let next = self.visit(node, &name, instance, &mut instances)?;
                    stack.extend(next.into_iter().rev());
                }
                Step::Close(instance) => {
                    let finished = std::mem::take(&mut instances[instance]);
                    rows.push(self.finalize(finished, &mut drift));
                }
            }
        }

        Ok(Decomposition { key, rows, drift })
    }

    /// Fold a node's own values into its instance and plan the walk of its children
    fn visit<'a>(
        &self,
        node: &'a Node,
        name: &str,
        instance: usize,
        instances: &mut Vec<Instance>,
    ) -> Result<Vec<Step<'a>>> {
        let table = instances[instance].table.clone();

        if let Some(value) = node.value() {
            instances[instance]
                .values
                .insert(self.config.stored_name(name).to_string(), value.to_string());
        }
        for (attribute, value) in &node.attributes {
            instances[instance]
                .values
                .insert(self.config.concatenate(name, attribute), value.clone());
        }

        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for child in &node.children {
            *occurrences
                .entry(self.config.concatenate(name, &child.name))
                .or_insert(0) += 1;
        }

        let mut order: HashMap<String, usize> = HashMap::new();
        let mut next = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let child_name = self.config.concatenate(name, &child.name);
            let candidate = self.config.concatenate(&table, &child_name);

            if self.layout.contains_table(&candidate) {
                let position = order.entry(candidate.clone()).or_insert(0);
                *position += 1;

                let mut keys = instances[instance].keys.clone();
                keys.insert(self.config.order_column(&candidate), position.to_string());
                instances.push(Instance {
                    table: candidate,
                    values: BTreeMap::new(),
                    keys,
                });
                let sub = instances.len() - 1;

                next.push(Step::Visit {
                    node: child,
                    name: String::new(),
                    instance: sub,
                });
                next.push(Step::Close(sub));
            } else if occurrences[&child_name] > 1 {
                return Err(MeltError::UnknownTableBoundary { table: candidate });
            } else {
                next.push(Step::Visit {
                    node: child,
                    name: child_name,
                    instance,
                });
            }
        }

        Ok(next)
    }

    /// Merge keys, drop fields unknown to the layout, and emit the row
    fn finalize(&self, instance: Instance, drift: &mut Vec<SchemaDrift>) -> Row {
        let Instance {
            table,
            mut values,
            keys,
        } = instance;
        values.extend(keys);

        values.retain(|field, _| {
            if self.layout.has_field(&table, field) {
                return true;
            }
            warn!(
                %table,
                %field,
                "ignoring field not in schema (it was not encountered during analysis)"
            );
            drift.push(SchemaDrift {
                table: table.clone(),
                field: field.clone(),
            });
            false
        });

        Row { table, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(pmid: &str) -> Node {
        Node::element("MedlineCitation")
            .with_child(Node::element("PMID").with_attr("Version", "1").with_text(pmid))
    }

    fn nested_citation() -> Node {
        let item = |label: &str| {
            Node::element("Item")
                .with_attr("Label", label)
                .with_child(Node::element("Tag").with_text("a"))
                .with_child(Node::element("Tag").with_text("b"))
        };
        let group = |prefix: &str| {
            let mut group = Node::element("Group");
            for i in 1..=3 {
                group = group.with_child(item(&format!("{}{}", prefix, i)));
            }
            group
        };
        citation("100").with_child(group("x")).with_child(group("y"))
    }

    #[test]
    fn test_keys_propagate_and_reset_per_parent() {
        let doc = nested_citation();
        let decomposer = RecordDecomposer::from_documents(&[doc.clone()], MeltConfig::default());
        let result = decomposer.decompose(&doc).unwrap();
        assert!(result.drift.is_empty());

        let items: Vec<&Row> = result.rows_for("MedlineCitation_Group_Item").collect();
        let orders: Vec<&str> = items
            .iter()
            .map(|r| r.get("MedlineCitation_Group_Item_Order").unwrap())
            .collect();
        assert_eq!(orders, vec!["1", "2", "3", "1", "2", "3"]);

        let tags: Vec<&Row> = result.rows_for("MedlineCitation_Group_Item_Tag").collect();
        assert_eq!(tags.len(), 12);
        for tag in &tags {
            assert_eq!(tag.get("PMID"), Some("100"));
            assert_eq!(tag.get("PMID_Version"), Some("1"));
            assert!(tag.get("MedlineCitation_Group_Order").is_some());
            assert!(tag.get("MedlineCitation_Group_Item_Order").is_some());
            assert!(tag.get("MedlineCitation_Group_Item_Tag_Order").is_some());
        }

        let last = tags.last().unwrap();
        assert_eq!(last.get("MedlineCitation_Group_Order"), Some("2"));
        assert_eq!(last.get("MedlineCitation_Group_Item_Order"), Some("3"));
        assert_eq!(last.get("MedlineCitation_Group_Item_Tag_Order"), Some("2"));
        assert_eq!(last.get("Value"), Some("b"));
    }

    #[test]
    fn test_rows_come_out_in_post_order() {
        let doc = nested_citation();
        let decomposer = RecordDecomposer::from_documents(&[doc.clone()], MeltConfig::default());
        let rows = decomposer.decompose(&doc).unwrap().rows;

        let tables: Vec<&str> = rows.iter().take(4).map(|r| r.table.as_str()).collect();
        assert_eq!(
            tables,
            vec![
                "MedlineCitation_Group_Item_Tag",
                "MedlineCitation_Group_Item_Tag",
                "MedlineCitation_Group_Item",
                "MedlineCitation_Group_Item_Tag",
            ]
        );
        assert_eq!(rows.last().unwrap().table, "MedlineCitation");
        assert_eq!(rows.len(), 1 + 2 + 6 + 12);
    }

    #[test]
    fn test_decomposition_is_deterministic() {
        let doc = nested_citation();
        let decomposer = RecordDecomposer::from_documents(&[doc.clone()], MeltConfig::default());
        assert_eq!(decomposer.decompose(&doc).unwrap(), decomposer.decompose(&doc).unwrap());
    }

    #[test]
    fn test_unknown_field_is_dropped() {
        let sample = citation("1").with_child(Node::element("Title").with_text("t"));
        let decomposer = RecordDecomposer::from_documents(&[sample], MeltConfig::default());

        let doc = citation("2")
            .with_child(Node::element("Title").with_text("u"))
            .with_child(Node::element("Novel").with_attr("Kind", "new"));
        let result = decomposer.decompose(&doc).unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("Title"), Some("u"));
        assert_eq!(result.rows[0].get("Novel_Kind"), None);
        assert_eq!(
            result.drift,
            vec![SchemaDrift { table: "MedlineCitation".into(), field: "Novel_Kind".into() }]
        );
    }

    #[test]
    fn test_unknown_repeated_child_is_error() {
        let sample = citation("1").with_child(Node::element("Keyword").with_text("k"));
        let decomposer = RecordDecomposer::from_documents(&[sample], MeltConfig::default());

        let doc = citation("2")
            .with_child(Node::element("Keyword").with_text("a"))
            .with_child(Node::element("Keyword").with_text("b"));
        match decomposer.decompose(&doc) {
            Err(MeltError::UnknownTableBoundary { table }) => {
                assert_eq!(table, "MedlineCitation_Keyword")
            }
            other => panic!("expected unknown table boundary, got {:?}", other),
        }
    }

    #[test]
    fn test_known_table_takes_single_child() {
        let sample = citation("1")
            .with_child(Node::element("Keyword").with_text("a"))
            .with_child(Node::element("Keyword").with_text("b"));
        let decomposer = RecordDecomposer::from_documents(&[sample], MeltConfig::default());

        let doc = citation("2").with_child(Node::element("Keyword").with_text("only"));
        let result = decomposer.decompose(&doc).unwrap();
        let keyword = result.rows_for("MedlineCitation_Keyword").next().unwrap();
        assert_eq!(keyword.get("Value"), Some("only"));
        assert_eq!(keyword.get("MedlineCitation_Keyword_Order"), Some("1"));
    }

    #[test]
    fn test_attribute_named_like_repeated_child_stays_on_parent() {
        let doc = citation("1").with_child(
            Node::element("List")
                .with_attr("Part", "2")
                .with_child(Node::element("Part").with_text("a"))
                .with_child(Node::element("Part").with_text("b")),
        );
        let decomposer = RecordDecomposer::from_documents(&[doc.clone()], MeltConfig::default());

        let result = decomposer.decompose(&doc).unwrap();
        assert!(result.drift.is_empty(), "drift: {:?}", result.drift);
        let root = result.rows_for("MedlineCitation").next().unwrap();
        assert_eq!(root.get("List_Part"), Some("2"));
        let parts: Vec<_> = result
            .rows_for("MedlineCitation_List_Part")
            .filter_map(|row| row.get("Value"))
            .collect();
        assert_eq!(parts, vec!["a", "b"]);
    }
}
