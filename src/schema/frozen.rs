//! Frozen schema produced by inference and the table layout decomposition runs against

use crate::config::MeltConfig;
use crate::error::Result;
use crate::melt::Row;
use crate::schema::VariableType;
use crate::store::Catalog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::{info, warn};

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub ty: VariableType,
}

/// A table with its columns sorted by name and its composite primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Infer a flat table from rows, observing every value of every column.
    ///
    /// `columns` are always present with at least the given type, even when no
    /// row carries them.
    pub fn from_rows(
        name: impl Into<String>,
        columns: &[(&str, VariableType)],
        rows: &[Row],
        primary_key: Vec<String>,
    ) -> Self {
        let mut types: BTreeMap<&str, VariableType> = columns.iter().copied().collect();
        for row in rows {
            for (field, value) in &row.values {
                types.entry(field.as_str()).or_default().observe(value);
            }
        }

        TableSchema {
            name: name.into(),
            columns: types
                .into_iter()
                .map(|(name, ty)| Column {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable result of schema inference, sorted by table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table → field oracle used by the decomposer
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            tables: self
                .tables
                .iter()
                .map(|t| (t.name.clone(), t.field_names().map(str::to_string).collect()))
                .collect(),
        }
    }

    /// Human readable listing of every table, field and type
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let _ = writeln!(out, "\n{}", table.name);
            for column in &table.columns {
                let _ = writeln!(out, "- {}\t{}", column.name, column.ty);
            }
        }
        out
    }

    /// Create every table in the catalog, leaving existing ones alone
    pub fn materialize(&self, catalog: &mut dyn Catalog) -> Result<()> {
        for table in &self.tables {
            if catalog.table_exists(&table.name)? {
                warn!(table = %table.name, "table already exists, not recreating it");
                continue;
            }
            info!(table = %table.name, "creating table");
            catalog.create_table(table)?;
        }
        info!(tables = self.tables.len(), "schema materialized");
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fixed set of tables and the fields each may hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl TableLayout {
    pub fn new<T, F, I>(tables: T) -> Self
    where
        T: IntoIterator<Item = (String, I)>,
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        TableLayout {
            tables: tables
                .into_iter()
                .map(|(name, fields)| (name, fields.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Rebuild the layout from a previously materialized catalog, keeping only
    /// tables rooted at the configured root table
    pub fn from_catalog(catalog: &dyn Catalog, config: &MeltConfig) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for table in catalog.list_tables()? {
            if !config.is_path_prefix(&config.root_table, &table) {
                continue;
            }
            let fields = catalog.list_fields(&table)?.into_iter().collect();
            tables.insert(table, fields);
        }
        Ok(TableLayout { tables })
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_field(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn fields(&self, table: &str) -> impl Iterator<Item = &str> {
        self.tables
            .get(table)
            .into_iter()
            .flat_map(|fields| fields.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
