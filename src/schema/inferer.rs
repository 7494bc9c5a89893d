//! Corpus-wide schema inference
//!
//! Rather than building a schema per document and merging, the inferer keeps two
//! append-only maps (table → fields, column path → type) and accumulates into them
//! for every document. The relational schema is produced only once, by
//! [`SchemaInferer::finish`].
//!
//! ## Table boundaries
//!
//! While walking a node's children under a table context, each child gets the
//! qualified name `table + "_" + path`. A child whose path occurs more than once
//! among its siblings, or whose qualified name is already a known table, opens a
//! sub-table and the field prefix starts over inside it. Every other child is
//! folded into the current table under the concatenated name.

use crate::config::MeltConfig;
use crate::document::Node;
use crate::schema::{Column, Schema, TableSchema, VariableType};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Accumulates tables, fields and column types over any number of documents
#[derive(Debug)]
pub struct SchemaInferer {
    config: MeltConfig,
    tables: BTreeMap<String, BTreeSet<String>>,
    // Keyed by the qualified column path so that a value first seen folded into a
    // parent and later inside its own sub-table reconciles to one type
    types: HashMap<String, VariableType>,
    // Column paths seen as attribute values and as element text
    attribute_paths: HashSet<String>,
    text_paths: HashSet<String>,
    documents: usize,
}

impl SchemaInferer {
    pub fn new(config: MeltConfig) -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(config.root_table.clone(), BTreeSet::new());
        SchemaInferer {
            config,
            tables,
            types: HashMap::new(),
            attribute_paths: HashSet::new(),
            text_paths: HashSet::new(),
            documents: 0,
        }
    }

    /// Fold one root-table element into the accumulated schema
    pub fn observe(&mut self, document: &Node) {
        let mut stack: Vec<(&Node, String, String)> =
            vec![(document, String::new(), self.config.root_table.clone())];

        while let Some((node, name, table)) = stack.pop() {
            if let Some(value) = node.value() {
                self.record(&table, &name, value, false);
            }
            for (attribute, value) in &node.attributes {
                let field = self.config.concatenate(&name, attribute);
                self.record(&table, &field, value, true);
            }

            let mut occurrences: HashMap<String, usize> = HashMap::new();
            let child_names: Vec<String> = node
                .children
                .iter()
                .map(|child| {
                    let child_name = self.config.concatenate(&name, &child.name);
                    *occurrences.entry(child_name.clone()).or_insert(0) += 1;
                    child_name
                })
                .collect();

            let mut next = Vec::with_capacity(node.children.len());
            for (child, child_name) in node.children.iter().zip(child_names) {
                let candidate = self.config.concatenate(&table, &child_name);
                if occurrences[&child_name] > 1 || self.tables.contains_key(&candidate) {
                    if !self.tables.contains_key(&candidate) {
                        debug!(table = %candidate, "discovered sub-table");
                        self.tables.insert(candidate.clone(), BTreeSet::new());
                    }
                    next.push((child, String::new(), candidate));
                } else {
                    next.push((child, child_name, table.clone()));
                }
            }
            stack.extend(next.into_iter().rev());
        }

        self.documents += 1;
    }

    fn record(&mut self, table: &str, field: &str, value: &str, from_attribute: bool) {
        let path = self.config.column_path(table, field);
        let origins = if from_attribute {
            &mut self.attribute_paths
        } else {
            &mut self.text_paths
        };
        if !origins.contains(&path) {
            origins.insert(path.clone());
        }
        self.types.entry(path).or_default().observe(value);
        if let Some(fields) = self.tables.get_mut(table) {
            if !fields.contains(field) {
                fields.insert(field.to_string());
            }
        }
    }

    pub fn documents_seen(&self) -> usize {
        self.documents
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Type observed so far for `field` of `table`
    pub fn variable_type(&self, table: &str, field: &str) -> Option<VariableType> {
        self.types
            .get(&self.config.column_path(table, field))
            .copied()
    }

    /// Finish inference and freeze the schema
    pub fn finish(mut self) -> Schema {
        self.relocate_subtable_fields();
        self.add_keys();

        let tables: Vec<TableSchema> = self
            .tables
            .iter()
            .map(|(table, fields)| self.freeze_table(table, fields))
            .collect();

        info!(
            documents = self.documents,
            tables = tables.len(),
            "schema inference finished"
        );
        Schema { tables }
    }

    /// Move fields that belong to a sub-table discovered after they were recorded.
    ///
    /// A field F of table T is misplaced when some table T' that is not an
    /// ancestor of T is a path prefix of `T_F`. It moves to the longest such
    /// table, under the remainder of the path.
    ///
    /// An attribute whose path is exactly a table's path stays where it is: the
    /// attribute sits on the parent of the repeated elements, not inside them.
    fn relocate_subtable_fields(&mut self) {
        let names: Vec<String> = self.tables.keys().cloned().collect();
        let mut moves: Vec<(String, String, String, String)> = Vec::new();
        let mut kept: Vec<(String, String)> = Vec::new();

        for (table, fields) in &self.tables {
            for field in fields {
                let path = self.config.column_path(table, field);
                let misplaced = names.iter().any(|other| {
                    !self.config.is_path_prefix(other, table)
                        && self.config.is_path_prefix(other, &path)
                });
                if !misplaced {
                    continue;
                }

                let owner = names
                    .iter()
                    .filter(|other| self.config.is_path_prefix(other, &path))
                    .max_by_key(|other| other.len())
                    .cloned()
                    .unwrap_or_else(|| table.clone());
                if path.len() == owner.len() {
                    if self.attribute_paths.contains(&path) {
                        kept.push((table.clone(), field.clone()));
                        if !self.text_paths.contains(&path) {
                            continue;
                        }
                    }
                    moves.push((table.clone(), field.clone(), owner, String::new()));
                } else {
                    let remainder = path[owner.len() + self.config.separator.len()..].to_string();
                    moves.push((table.clone(), field.clone(), owner, remainder));
                }
            }
        }

        for (table, field, owner, remainder) in moves {
            debug!(%table, %field, %owner, "moving field into its sub-table");
            if let Some(fields) = self.tables.get_mut(&table) {
                fields.remove(&field);
            }
            if let Some(fields) = self.tables.get_mut(&owner) {
                fields.insert(remainder);
            }
        }
        for (table, field) in kept {
            if let Some(fields) = self.tables.get_mut(&table) {
                fields.insert(field);
            }
        }
    }

    /// Inject the order and natural id columns every table needs to be reassembled
    fn add_keys(&mut self) {
        let names: BTreeSet<String> = self.tables.keys().cloned().collect();
        let root = self.config.root_table.clone();
        let separator = self.config.separator.clone();
        let order_type = VariableType::new(true, MeltConfig::ORDER_WIDTH);

        for table in &names {
            let mut keys: Vec<(String, VariableType)> = Vec::new();

            let mut parent = table.as_str();
            while let Some(index) = parent.rfind(separator.as_str()) {
                parent = &parent[..index];
                if parent != root && names.contains(parent) {
                    keys.push((self.config.order_column(parent), order_type));
                }
            }
            if *table != root {
                keys.push((self.config.order_column(table), order_type));
            }
            keys.push((
                self.config.id_column().to_string(),
                VariableType::new(true, MeltConfig::ID_WIDTH),
            ));
            keys.push((
                self.config.version_column(),
                VariableType::new(true, MeltConfig::VERSION_WIDTH),
            ));

            for (field, ty) in keys {
                let path = self.config.column_path(table, &field);
                let fields = self.tables.entry(table.clone()).or_default();
                if fields.contains(&field) && *table != root {
                    warn!(%table, %field, "observed field is shadowed by a key column");
                }
                fields.insert(field);
                self.types.entry(path).or_insert(ty).widen(ty);
            }
        }
    }

    fn freeze_table(&self, table: &str, fields: &BTreeSet<String>) -> TableSchema {
        let mut columns: Vec<Column> = fields
            .iter()
            .map(|field| Column {
                name: self.config.stored_name(field).to_string(),
                ty: self
                    .types
                    .get(&self.config.column_path(table, field))
                    .copied()
                    .unwrap_or_default(),
            })
            .collect();
        columns.sort_by(|a, b| a.name.cmp(&b.name));

        let mut primary_key = vec![
            self.config.id_column().to_string(),
            self.config.version_column(),
        ];
        primary_key.extend(
            columns
                .iter()
                .filter(|c| self.config.is_order_column(&c.name))
                .map(|c| c.name.clone()),
        );

        TableSchema {
            name: table.to_string(),
            columns,
            primary_key,
        }
    }
}

/// Infer a schema from a slice of root-table elements
pub fn infer_schema(documents: &[Node], config: MeltConfig) -> Schema {
    let mut inferer = SchemaInferer::new(config);
    for document in documents {
        inferer.observe(document);
    }
    inferer.finish()
}
