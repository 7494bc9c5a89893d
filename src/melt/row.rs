use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a normalized table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Table the row belongs to, e.g. "MedlineCitation_AuthorList_Author"
    pub table: String,

    /// Field name → value, keys included
    pub values: BTreeMap<String, String>,
}

impl Row {
    pub fn new(table: impl Into<String>) -> Self {
        Row {
            table: table.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }
}

/// A field dropped because the schema has no column for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDrift {
    pub table: String,
    pub field: String,
}

/// Natural id and version of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub id: String,
    pub version: String,
}

/// Rows produced from one document, in post-order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub key: DocumentKey,
    pub rows: Vec<Row>,
    pub drift: Vec<SchemaDrift>,
}

impl Decomposition {
    pub fn rows_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows.iter().filter(move |row| row.table == table)
    }
}
