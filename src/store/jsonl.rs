use crate::error::{MeltError, Result};
use crate::melt::Row;
use crate::store::{DataSink, KeyFilter, NameMangler, Verbatim};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Change-log sink writing one JSON Lines file per table.
///
/// Each line is either an inserted row tagged `"_op": "insert"` or a delete
/// tombstone tagged `"_op": "delete"` that carries the key it removes. Replaying
/// a file in order yields the current rows of its table. Records of an open
/// unit of work are held back until it commits.
pub struct JsonlSink {
    dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
    names: Box<dyn NameMangler>,
    pending: Option<Vec<(String, Map<String, Value>)>>,
}

impl JsonlSink {
    /// Create a sink appending to files in `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(JsonlSink {
            dir: dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
            names: Box::new(Verbatim),
            pending: None,
        })
    }

    pub fn with_names(mut self, names: Box<dyn NameMangler>) -> Self {
        self.names = names;
        self
    }

    fn record(&mut self, table: &str, record: Map<String, Value>) -> Result<()> {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.push((table.to_string(), record));
                Ok(())
            }
            None => self.write_line(table, record),
        }
    }

    fn write_line(&mut self, table: &str, record: Map<String, Value>) -> Result<()> {
        let file_name = format!("{}.jsonl", self.names.mangle(table));
        if !self.writers.contains_key(&file_name) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(&file_name))?;
            self.writers.insert(file_name.clone(), BufWriter::new(file));
        }
        if let Some(writer) = self.writers.get_mut(&file_name) {
            serde_json::to_writer(&mut *writer, &record)?;
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl DataSink for JsonlSink {
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        for row in rows {
            let mut record = Map::new();
            record.insert("_op".into(), Value::from("insert"));
            for (field, value) in &row.values {
                record.insert(self.names.mangle(field), Value::from(value.as_str()));
            }
            self.record(table, record)?;
        }
        Ok(())
    }

    fn delete_where(&mut self, table: &str, filter: &KeyFilter<'_>) -> Result<()> {
        let mut record = Map::new();
        record.insert("_op".into(), Value::from("delete"));
        record.insert(self.names.mangle(filter.id_field), Value::from(filter.id_value));
        record.insert(
            self.names.mangle(filter.version_field),
            Value::from(filter.version_value),
        );
        self.record(table, record)
    }

    fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(MeltError::Store("a unit of work is already open".into()));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        for (table, record) in self.pending.take().unwrap_or_default() {
            self.write_line(&table, record)?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = DataSink::flush(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Abbreviator;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_inserts_and_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new(dir.path()).unwrap();

        let filter = KeyFilter {
            id_field: "PMID",
            id_value: "1",
            version_field: "PMID_Version",
            version_value: "1",
        };
        sink.delete_where("MedlineCitation", &filter).unwrap();
        sink.insert_batch(
            "MedlineCitation",
            &[Row::new("MedlineCitation").with("PMID", "1").with("PMID_Version", "1")],
        )
        .unwrap();
        sink.flush().unwrap();

        let lines = read_lines(&dir.path().join("MedlineCitation.jsonl"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["_op"], "delete");
        assert_eq!(lines[0]["PMID"], "1");
        assert_eq!(lines[1]["_op"], "insert");
        assert_eq!(lines[1]["PMID_Version"], "1");
    }

    #[test]
    fn test_rolled_back_records_are_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new(dir.path()).unwrap();
        let row = Row::new("MedlineCitation").with("PMID", "1");

        sink.begin().unwrap();
        sink.insert_batch("MedlineCitation", &[row.clone()]).unwrap();
        sink.rollback().unwrap();

        sink.begin().unwrap();
        sink.insert_batch("MedlineCitation", &[row.clone(), row]).unwrap();
        sink.commit().unwrap();
        sink.flush().unwrap();

        assert_eq!(read_lines(&dir.path().join("MedlineCitation.jsonl")).len(), 2);
    }

    #[test]
    fn test_file_names_are_mangled() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = JsonlSink::new(dir.path())
                .unwrap()
                .with_names(Box::new(Abbreviator::default()));
            sink.insert_batch(
                "MedlineCitation_Article",
                &[Row::new("MedlineCitation_Article").with("Article_Title", "t")],
            )
            .unwrap();
        }

        let lines = read_lines(&dir.path().join("MedCit_Art.jsonl"));
        assert_eq!(lines[0]["Art_Title"], "t");
    }
}
