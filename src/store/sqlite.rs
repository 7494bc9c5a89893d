//! SQLite-backed catalog and sink

use crate::error::{MeltError, Result};
use crate::melt::Row;
use crate::schema::{Dialect, TableSchema};
use crate::store::{Catalog, DataSink, KeyFilter, NameMangler, Verbatim};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Quote an identifier for SQL
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// CREATE TABLE statement for a table, with column types mapped through `dialect`
/// and names passed through `names`
pub fn create_table_sql(table: &TableSchema, dialect: Dialect, names: &dyn NameMangler) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote(&names.mangle(&c.name)), dialect.map_type(&c.ty)))
        .collect();
    if !table.primary_key.is_empty() {
        let key: Vec<String> = table
            .primary_key
            .iter()
            .map(|k| quote(&names.mangle(k)))
            .collect();
        parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
    }
    format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote(&names.mangle(&table.name)),
        parts.join(",\n  ")
    )
}

/// Catalog and sink over one SQLite database
///
/// Connections are not shared between threads; each thread that ingests opens its
/// own store.
pub struct SqliteStore {
    conn: Connection,
    names: Box<dyn NameMangler>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, names: Box<dyn NameMangler>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(SqliteStore { conn, names })
    }

    /// Private in-memory database, names stored verbatim
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteStore {
            conn,
            names: Box::new(Verbatim),
        })
    }

    pub fn with_names(mut self, names: Box<dyn NameMangler>) -> Self {
        self.names = names;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(&self.names.mangle(table)));
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl Catalog for SqliteStore {
    fn create_table(&mut self, table: &TableSchema) -> Result<()> {
        let sql = create_table_sql(table, Dialect::Sqlite, self.names.as_ref());
        debug!(%sql, "creating table");
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![self.names.mangle(table)],
                |_| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.iter().map(|n| self.names.unmangle(n)).collect())
    }

    fn list_fields(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", quote(&self.names.mangle(table)));
        let mut stmt = self.conn.prepare(&sql)?;
        let fields = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if fields.is_empty() {
            return Err(MeltError::Store(format!("no such table: {}", table)));
        }
        Ok(fields.iter().map(|f| self.names.unmangle(f)).collect())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote(&self.names.mangle(table)));
        self.conn.execute_batch(&sql)?;
        Ok(())
    }
}

fn insert_rows(conn: &Connection, names: &dyn NameMangler, table: &str, rows: &[Row]) -> Result<()> {
    let stored_table = quote(&names.mangle(table));
    for row in rows {
        let columns: Vec<String> = row.values.keys().map(|k| quote(&names.mangle(k))).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            stored_table,
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(row.values.values()))?;
    }
    Ok(())
}

impl DataSink for SqliteStore {
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        let names = self.names.as_ref();
        if !self.conn.is_autocommit() {
            // Part of a unit opened by `begin`
            return insert_rows(&self.conn, names, table, rows);
        }
        let tx = self.conn.transaction()?;
        insert_rows(&tx, names, table, rows)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
            quote(&self.names.mangle(table)),
            quote(&self.names.mangle(filter.id_field)),
            quote(&self.names.mangle(filter.version_field)),
        );
        self.conn
            .execute(&sql, params![filter.id_value, filter.version_value])?;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeltConfig;
    use crate::document::Node;
    use crate::melt::{IngestCoordinator, RecordDecomposer};
    use crate::schema::{infer_schema, Column, TableLayout, VariableType};
    use crate::store::Abbreviator;

    fn citation(pmid: &str, authors: &[&str]) -> Node {
        let mut list = Node::element("AuthorList");
        for name in authors {
            list = list.with_child(Node::element("Author").with_child(Node::element("LastName").with_text(*name)));
        }
        Node::element("MedlineCitation")
            .with_child(Node::element("PMID").with_attr("Version", "1").with_text(pmid))
            .with_child(Node::element("Article").with_child(list))
    }

    #[test]
    fn test_ddl_uses_dialect_and_names() {
        let table = TableSchema {
            name: "MedlineCitation_Article".into(),
            columns: vec![
                Column { name: "PMID".into(), ty: VariableType::new(true, 8) },
                Column { name: "Title".into(), ty: VariableType::new(false, 300) },
            ],
            primary_key: vec!["PMID".into()],
        };
        let sql = create_table_sql(&table, Dialect::MsSql, &Abbreviator::default());
        assert!(sql.starts_with("CREATE TABLE \"MedCit_Art\""));
        assert!(sql.contains("\"PMID\" INT"));
        assert!(sql.contains("\"Title\" VARCHAR(MAX)"));
        assert!(sql.contains("PRIMARY KEY (\"PMID\")"));
    }

    #[test]
    fn test_catalog_round_trip_through_abbreviations() {
        let doc = citation("12", &["Smith", "Jones"]);
        let config = MeltConfig::default();
        let schema = infer_schema(&[doc], config.clone());

        let mut store = SqliteStore::open_in_memory()
            .unwrap()
            .with_names(Box::new(Abbreviator::default()));
        schema.materialize(&mut store).unwrap();

        assert!(store.table_exists("MedlineCitation_Article_AuthorList_Author").unwrap());
        let layout = TableLayout::from_catalog(&store, &config).unwrap();
        assert_eq!(layout, schema.layout());

        // materializing again leaves the existing tables alone
        schema.materialize(&mut store).unwrap();
    }

    #[test]
    fn test_ingest_replaces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeltConfig::default();
        let first = citation("12", &["Smith", "Jones", "Li"]);
        let schema = infer_schema(&[first.clone()], config.clone());

        let mut store = SqliteStore::open(dir.path().join("medline.db"), Box::new(Verbatim)).unwrap();
        schema.materialize(&mut store).unwrap();

        let decomposer = RecordDecomposer::from_schema(&schema, config);
        let mut coordinator = IngestCoordinator::new(decomposer, store, 2);
        coordinator.ingest(&first).unwrap();
        coordinator.ingest(&citation("12", &["Smith"])).unwrap();
        coordinator.ingest(&citation("13", &["Kim", "Park"])).unwrap();

        let store = coordinator.into_sink();
        assert_eq!(store.count("MedlineCitation").unwrap(), 2);
        assert_eq!(store.count("MedlineCitation_Article_AuthorList_Author").unwrap(), 3);

        let pmid: i64 = store
            .connection()
            .query_row(
                "SELECT PMID FROM MedlineCitation_Article_AuthorList_Author WHERE LastName = 'Smith'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(pmid, 12);
    }

    #[test]
    fn test_failed_replace_rolls_back() {
        let config = MeltConfig::default();
        let stored = citation("12", &["Smith", "Jones"]);
        let schema = infer_schema(&[stored.clone()], config.clone());
        let mut store = SqliteStore::open_in_memory().unwrap();
        schema.materialize(&mut store).unwrap();

        let stored_layout = RecordDecomposer::from_schema(&schema, config.clone());
        let mut coordinator = IngestCoordinator::new(stored_layout.clone(), &mut store, 10);
        coordinator.ingest(&stored).unwrap();

        // The database has no Initials column, so the author insert fails after
        // the deletes and the root row insert have run
        let author = |name: &str| {
            Node::element("Author")
                .with_child(Node::element("LastName").with_text(name))
                .with_child(Node::element("Initials").with_text("X"))
        };
        let update = Node::element("MedlineCitation")
            .with_child(Node::element("PMID").with_attr("Version", "1").with_text("12"))
            .with_child(
                Node::element("Article").with_child(
                    Node::element("AuthorList").with_child(author("Kim")).with_child(author("Li")),
                ),
            );
        let decomposer = RecordDecomposer::from_documents(&[update.clone()], config);
        let mut coordinator = IngestCoordinator::new(decomposer, &mut store, 10);
        assert!(coordinator.ingest(&update).is_err());

        assert!(store.connection().is_autocommit());
        assert_eq!(store.count("MedlineCitation").unwrap(), 1);
        assert_eq!(store.count("MedlineCitation_Article_AuthorList_Author").unwrap(), 2);

        // the store is usable again afterwards
        let mut coordinator = IngestCoordinator::new(stored_layout, &mut store, 10);
        coordinator.ingest(&citation("12", &["Smith"])).unwrap();
        assert_eq!(store.count("MedlineCitation_Article_AuthorList_Author").unwrap(), 1);
    }

    #[test]
    fn test_drop_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let table = TableSchema {
            name: "mesh_term".into(),
            columns: vec![Column { name: "ui".into(), ty: VariableType::new(false, 7) }],
            primary_key: vec![],
        };
        store.create_table(&table).unwrap();
        store.drop_table("mesh_term").unwrap();
        assert!(!store.table_exists("mesh_term").unwrap());
        store.drop_table("mesh_term").unwrap();
    }
}
