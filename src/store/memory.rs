use crate::error::{MeltError, Result};
use crate::melt::Row;
use crate::schema::TableSchema;
use crate::store::{Catalog, DataSink, KeyFilter};
use std::collections::BTreeMap;

/// In-memory catalog and sink, keyed by table name
///
/// Rows may be inserted into tables that were never created, so a sink can be
/// used without materializing a schema first.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, TableSchema>,
    rows: BTreeMap<String, Vec<Row>>,
    // Rows of every table touched since `begin`, as they were before
    undo: Option<BTreeMap<String, Option<Vec<Row>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Copy of every stored row, by table
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Row>> {
        self.rows
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(table, rows)| (table.clone(), rows.clone()))
            .collect()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    fn remember(&mut self, table: &str) {
        if let Some(undo) = self.undo.as_mut() {
            if !undo.contains_key(table) {
                undo.insert(table.to_string(), self.rows.get(table).cloned());
            }
        }
    }
}

impl Catalog for MemoryStore {
    fn create_table(&mut self, table: &TableSchema) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(MeltError::Store(format!("table {} already exists", table.name)));
        }
        self.tables.insert(table.name.clone(), table.clone());
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.contains_key(table))
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn list_fields(&self, table: &str) -> Result<Vec<String>> {
        self.tables
            .get(table)
            .map(|t| t.field_names().map(str::to_string).collect())
            .ok_or_else(|| MeltError::Store(format!("no such table: {}", table)))
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        self.tables.remove(table);
        self.rows.remove(table);
        Ok(())
    }
}

impl DataSink for MemoryStore {
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        self.remember(table);
        self.rows
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Ok(())
    }

    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()> {
        self.remember(table);
        if let Some(rows) = self.rows.get_mut(table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.undo.is_some() {
            return Err(MeltError::Store("a unit of work is already open".into()));
        }
        self.undo = Some(BTreeMap::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.undo = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        for (table, saved) in self.undo.take().unwrap_or_default() {
            match saved {
                Some(rows) => {
                    self.rows.insert(table, rows);
                }
                None => {
                    self.rows.remove(&table);
                }
            }
        }
        Ok(())
    }
}
