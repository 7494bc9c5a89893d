//! Storage collaborators: catalogs that hold table definitions and sinks that take rows
//!
//! The core never talks to a database directly. Schema materialization goes through
//! [`Catalog`], ingestion through [`DataSink`]. Store-side naming limits are handled
//! by a [`NameMangler`] inside each store, so the rest of the crate only ever sees
//! full table and field names.

pub mod jsonl;
pub mod memory;
pub mod names;
pub mod sqlite;

pub use jsonl::JsonlSink;
pub use memory::MemoryStore;
pub use names::{name_mangler, Abbreviator, NameMangler, Verbatim};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::melt::Row;
use crate::schema::TableSchema;

/// Holds table definitions
pub trait Catalog {
    /// Create a table with its columns and primary key
    fn create_table(&mut self, table: &TableSchema) -> Result<()>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Every table, under its full (unmangled) name
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Every column of a table, under its full (unmangled) name
    fn list_fields(&self, table: &str) -> Result<Vec<String>>;

    /// Drop a table and its rows; a missing table is not an error
    fn drop_table(&mut self, table: &str) -> Result<()>;
}

/// Equality filter on a document's natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFilter<'a> {
    pub id_field: &'a str,
    pub id_value: &'a str,
    pub version_field: &'a str,
    pub version_value: &'a str,
}

impl KeyFilter<'_> {
    pub fn matches(&self, row: &Row) -> bool {
        row.get(self.id_field) == Some(self.id_value)
            && row.get(self.version_field) == Some(self.version_value)
    }
}

/// Takes rows and key deletes.
///
/// Writes between [`DataSink::begin`] and [`DataSink::commit`] form one unit:
/// after [`DataSink::rollback`] none of them are visible. Units do not nest.
pub trait DataSink {
    /// Insert rows that all belong to `table`
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()>;

    /// Remove every row of `table` matching the filter
    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: DataSink + ?Sized> DataSink for &mut S {
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        (**self).insert_batch(table, rows)
    }

    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()> {
        (**self).delete_where(table, filter)
    }

    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: DataSink + ?Sized> DataSink for Box<S> {
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        (**self).insert_batch(table, rows)
    }

    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()> {
        (**self).delete_where(table, filter)
    }

    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
