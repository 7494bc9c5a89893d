//! MeSH vocabulary: terms, relationships and the ancestor closure of the tree
//!
//! Descriptor and supplementary record files are streamed rather than loaded as
//! trees; each element's dotted path (e.g.
//! `DescriptorRecordSet.DescriptorRecord.DescriptorUI`) decides what its text is.

use crate::closure::build_closure;
use crate::error::{MeltError, Result};
use crate::melt::Row;
use crate::schema::{TableSchema, VariableType};
use crate::source::open_reader;
use crate::store::{Catalog, DataSink};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TERM_TABLE: &str = "mesh_term";
pub const RELATIONSHIP_TABLE: &str = "mesh_relationship";
pub const ANCESTOR_TABLE: &str = "mesh_ancestor";

const PHARMACOLOGICAL_ACTION: &str = "Pharmacological action";
const MAPS_TO: &str = "Maps to";

const TEXT: VariableType = VariableType {
    is_numeric: false,
    max_width: 0,
};
const NUMBER: VariableType = VariableType {
    is_numeric: true,
    max_width: 0,
};

const TERM_COLUMNS: &[(&str, VariableType)] =
    &[("ui", TEXT), ("name", TEXT), ("supplement", NUMBER)];
const RELATIONSHIP_COLUMNS: &[(&str, VariableType)] =
    &[("ui_1", TEXT), ("ui_2", TEXT), ("relationship_id", TEXT)];
const ANCESTOR_COLUMNS: &[(&str, VariableType)] = &[
    ("ancestor_ui", TEXT),
    ("descendant_ui", TEXT),
    ("min_distance", NUMBER),
    ("max_distance", NUMBER),
];

const DESCRIPTOR_RECORD: &str = "DescriptorRecordSet.DescriptorRecord";
const SUPPLEMENTAL_RECORD: &str = "SupplementalRecordSet.SupplementalRecord";

/// Call `on_close(path, text)` at the end of every element, with the element's
/// dotted path and its trimmed text
fn stream_elements<R, F>(reader: R, mut on_close: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&str, &str) -> Result<()>,
{
    let mut reader = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                on_close(&path.join("."), "")?;
                path.pop();
            }
            Ok(Event::Text(ref t)) => {
                let unescaped = t.unescape().map_err(|e| MeltError::Xml(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(ref c)) => text.push_str(&String::from_utf8_lossy(c)),
            Ok(Event::End(_)) => {
                on_close(&path.join("."), text.trim())?;
                text.clear();
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MeltError::Xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn relationship(ui_1: &str, ui_2: &str, relationship_id: &str) -> Row {
    Row::new(RELATIONSHIP_TABLE)
        .with("ui_1", ui_1)
        .with("ui_2", ui_2)
        .with("relationship_id", relationship_id)
}

/// Terms, relationships and tree numbers read from the MeSH files
#[derive(Debug, Default)]
pub struct MeshVocabulary {
    pub terms: Vec<Row>,
    pub relationships: Vec<Row>,
    /// Tree number → descriptor ui
    pub tree_numbers: HashMap<String, String>,
}

impl MeshVocabulary {
    /// Read the descriptor and supplementary files of a MeSH folder
    pub fn load<P: AsRef<Path>>(folder: P) -> anyhow::Result<Self> {
        let (descriptors, supplementals) = locate_files(folder.as_ref())?;
        let mut vocabulary = MeshVocabulary::default();

        info!("Parsing main file {}", descriptors.display());
        vocabulary.read_descriptors(open_reader(&descriptors)?)?;
        info!("Parsing supplement file {}", supplementals.display());
        vocabulary.read_supplementals(open_reader(&supplementals)?)?;
        Ok(vocabulary)
    }

    /// Read a `DescriptorRecordSet`
    pub fn read_descriptors<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let ui_path = format!("{}.DescriptorUI", DESCRIPTOR_RECORD);
        let name_path = format!("{}.DescriptorName.String", DESCRIPTOR_RECORD);
        let tree_path = format!("{}.TreeNumberList.TreeNumber", DESCRIPTOR_RECORD);
        let action_path = format!(
            "{}.PharmacologicalActionList.PharmacologicalAction.DescriptorReferredTo.DescriptorUI",
            DESCRIPTOR_RECORD
        );

        let mut term = Row::new(TERM_TABLE);
        let mut ui = String::new();
        stream_elements(reader, |path, text| {
            if path == ui_path {
                ui = text.to_string();
                term.values.insert("ui".into(), ui.clone());
            } else if path == name_path {
                term.values.insert("name".into(), text.to_string());
            } else if path == tree_path {
                self.tree_numbers.insert(text.to_string(), ui.clone());
            } else if path == action_path {
                self.relationships
                    .push(relationship(&ui, text, PHARMACOLOGICAL_ACTION));
            } else if path == DESCRIPTOR_RECORD {
                let done = std::mem::replace(&mut term, Row::new(TERM_TABLE));
                self.terms.push(done.with("supplement", "0"));
            }
            Ok(())
        })
    }

    /// Read a `SupplementalRecordSet`
    pub fn read_supplementals<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let ui_path = format!("{}.SupplementalRecordUI", SUPPLEMENTAL_RECORD);
        let name_path = format!("{}.SupplementalRecordName.String", SUPPLEMENTAL_RECORD);
        let mapped_path = format!(
            "{}.HeadingMappedToList.HeadingMappedTo.DescriptorReferredTo.DescriptorUI",
            SUPPLEMENTAL_RECORD
        );
        let action_path = format!(
            "{}.PharmacologicalActionList.PharmacologicalAction.DescriptorReferredTo.DescriptorUI",
            SUPPLEMENTAL_RECORD
        );

        let mut term = Row::new(TERM_TABLE);
        let mut ui = String::new();
        stream_elements(reader, |path, text| {
            if path == ui_path {
                ui = text.to_string();
                term.values.insert("ui".into(), ui.clone());
            } else if path == name_path {
                term.values.insert("name".into(), text.to_string());
            } else if path == mapped_path {
                // Mapped headings flag major topics with a leading '*'
                self.relationships
                    .push(relationship(&ui, &text.replace('*', ""), MAPS_TO));
            } else if path == action_path {
                self.relationships
                    .push(relationship(&ui, text, PHARMACOLOGICAL_ACTION));
            } else if path == SUPPLEMENTAL_RECORD {
                let done = std::mem::replace(&mut term, Row::new(TERM_TABLE));
                self.terms.push(done.with("supplement", "1"));
            }
            Ok(())
        })
    }

    /// Ancestor rows derived from the descriptor tree numbers
    pub fn ancestors(&self) -> Vec<Row> {
        build_closure(&self.tree_numbers)
            .iter()
            .map(|pair| pair.to_row(ANCESTOR_TABLE))
            .collect()
    }

    /// Create the vocabulary tables and fill them.
    ///
    /// Tables left by an earlier load are dropped first, so loading a new
    /// release replaces the previous one.
    pub fn write_to<S: Catalog + DataSink>(&self, store: &mut S, batch_size: usize) -> Result<()> {
        let ancestors = self.ancestors();
        let tables = [
            (TERM_TABLE, TERM_COLUMNS, &self.terms, vec!["ui".to_string()]),
            (RELATIONSHIP_TABLE, RELATIONSHIP_COLUMNS, &self.relationships, vec![]),
            (
                ANCESTOR_TABLE,
                ANCESTOR_COLUMNS,
                &ancestors,
                vec!["ancestor_ui".to_string(), "descendant_ui".to_string()],
            ),
        ];

        for (name, columns, rows, primary_key) in tables {
            let schema = TableSchema::from_rows(name, columns, rows, primary_key);
            if store.table_exists(name)? {
                info!(table = name, "replacing existing table");
                store.drop_table(name)?;
            }
            store.create_table(&schema)?;
            for batch in rows.chunks(batch_size.max(1)) {
                store.insert_batch(name, batch)?;
            }
            info!(table = name, rows = rows.len(), "table written");
        }
        store.flush()
    }
}

/// Find the single descriptor (`desc*`) and supplementary (`supp*`) file of a folder
pub fn locate_files(folder: &Path) -> Result<(PathBuf, PathBuf)> {
    let mut descriptors = None;
    let mut supplementals = None;

    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(name.ends_with(".xml") || name.ends_with(".xml.gz")) {
            continue;
        }
        let slot = if name.starts_with("desc") {
            &mut descriptors
        } else if name.starts_with("supp") {
            &mut supplementals
        } else {
            continue;
        };
        if slot.is_some() {
            return Err(MeltError::Config(format!(
                "multiple {} MeSH files in {}, keep only one",
                if name.starts_with("desc") { "main" } else { "supplementary" },
                folder.display()
            )));
        }
        *slot = Some(path);
    }

    match (descriptors, supplementals) {
        (Some(d), Some(s)) => Ok((d, s)),
        (None, _) => Err(MeltError::Config(format!(
            "no main MeSH file (desc*) in {}",
            folder.display()
        ))),
        (_, None) => Err(MeltError::Config(format!(
            "no supplementary MeSH file (supp*) in {}",
            folder.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    const DESCRIPTORS: &str = r#"<?xml version="1.0"?>
<DescriptorRecordSet>
  <DescriptorRecord>
    <DescriptorUI>D001</DescriptorUI>
    <DescriptorName><String>Body Regions</String></DescriptorName>
    <TreeNumberList><TreeNumber>A01</TreeNumber></TreeNumberList>
  </DescriptorRecord>
  <DescriptorRecord>
    <DescriptorUI>D002</DescriptorUI>
    <DescriptorName><String>Abdomen</String></DescriptorName>
    <TreeNumberList>
      <TreeNumber>A01.047</TreeNumber>
      <TreeNumber>A01.923.047</TreeNumber>
    </TreeNumberList>
    <PharmacologicalActionList>
      <PharmacologicalAction>
        <DescriptorReferredTo><DescriptorUI>D900</DescriptorUI></DescriptorReferredTo>
      </PharmacologicalAction>
    </PharmacologicalActionList>
  </DescriptorRecord>
</DescriptorRecordSet>"#;

    const SUPPLEMENTALS: &str = r#"<SupplementalRecordSet>
  <SupplementalRecord>
    <SupplementalRecordUI>C100</SupplementalRecordUI>
    <SupplementalRecordName><String>Compound &amp; Co</String></SupplementalRecordName>
    <HeadingMappedToList>
      <HeadingMappedTo><DescriptorReferredTo><DescriptorUI>*D002</DescriptorUI></DescriptorReferredTo></HeadingMappedTo>
    </HeadingMappedToList>
  </SupplementalRecord>
</SupplementalRecordSet>"#;

    fn vocabulary() -> MeshVocabulary {
        let mut vocabulary = MeshVocabulary::default();
        vocabulary.read_descriptors(DESCRIPTORS.as_bytes()).unwrap();
        vocabulary.read_supplementals(SUPPLEMENTALS.as_bytes()).unwrap();
        vocabulary
    }

    #[test]
    fn test_terms_and_relationships() {
        let v = vocabulary();
        assert_eq!(v.terms.len(), 3);
        assert_eq!(v.terms[1].get("name"), Some("Abdomen"));
        assert_eq!(v.terms[1].get("supplement"), Some("0"));
        assert_eq!(v.terms[2].get("name"), Some("Compound & Co"));
        assert_eq!(v.terms[2].get("supplement"), Some("1"));

        assert_eq!(v.relationships.len(), 2);
        assert_eq!(v.relationships[0].get("ui_2"), Some("D900"));
        assert_eq!(v.relationships[1].get("ui_1"), Some("C100"));
        assert_eq!(v.relationships[1].get("ui_2"), Some("D002"));
        assert_eq!(v.relationships[1].get("relationship_id"), Some("Maps to"));

        assert_eq!(v.tree_numbers.get("A01.923.047").map(String::as_str), Some("D002"));
    }

    #[test]
    fn test_ancestors_merge_tree_positions() {
        let ancestors = vocabulary().ancestors();
        let pair = ancestors
            .iter()
            .find(|r| r.get("descendant_ui") == Some("D002") && r.get("ancestor_ui") == Some("D001"))
            .unwrap();
        assert_eq!(pair.get("min_distance"), Some("1"));
        assert_eq!(pair.get("max_distance"), Some("2"));
    }

    #[test]
    fn test_write_to_store() {
        let mut store = MemoryStore::new();
        vocabulary().write_to(&mut store, 1).unwrap();

        assert_eq!(store.rows(TERM_TABLE).len(), 3);
        assert!(store.table(TERM_TABLE).unwrap().column("supplement").unwrap().ty.is_numeric);
        assert!(!store.rows(ANCESTOR_TABLE).is_empty());
    }

    #[test]
    fn test_write_to_sqlite_without_relationships() {
        let descriptors = r#"<DescriptorRecordSet>
  <DescriptorRecord>
    <DescriptorUI>D001</DescriptorUI>
    <DescriptorName><String>Body Regions</String></DescriptorName>
    <TreeNumberList><TreeNumber>A01</TreeNumber></TreeNumberList>
  </DescriptorRecord>
</DescriptorRecordSet>"#;
        let mut vocabulary = MeshVocabulary::default();
        vocabulary.read_descriptors(descriptors.as_bytes()).unwrap();
        assert!(vocabulary.relationships.is_empty());

        let mut store = SqliteStore::open_in_memory().unwrap();
        vocabulary.write_to(&mut store, 100).unwrap();

        assert_eq!(store.count(TERM_TABLE).unwrap(), 1);
        assert_eq!(store.count(RELATIONSHIP_TABLE).unwrap(), 0);
        assert_eq!(
            store.list_fields(RELATIONSHIP_TABLE).unwrap(),
            vec!["relationship_id", "ui_1", "ui_2"]
        );
        assert_eq!(store.count(ANCESTOR_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_second_load_replaces_tables() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        vocabulary().write_to(&mut store, 2).unwrap();
        let ancestors = store.count(ANCESTOR_TABLE).unwrap();

        vocabulary().write_to(&mut store, 2).unwrap();
        assert_eq!(store.count(TERM_TABLE).unwrap(), 3);
        assert_eq!(store.count(RELATIONSHIP_TABLE).unwrap(), 2);
        assert_eq!(store.count(ANCESTOR_TABLE).unwrap(), ancestors);
    }

    #[test]
    fn test_locate_requires_one_of_each() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("desc2024.xml"), DESCRIPTORS).unwrap();
        assert!(matches!(locate_files(dir.path()), Err(MeltError::Config(_))));

        std::fs::write(dir.path().join("supp2024.xml"), SUPPLEMENTALS).unwrap();
        let (d, s) = locate_files(dir.path()).unwrap();
        assert!(d.ends_with("desc2024.xml"));
        assert!(s.ends_with("supp2024.xml"));

        std::fs::write(dir.path().join("desc2025.xml"), DESCRIPTORS).unwrap();
        assert!(locate_files(dir.path()).is_err());

        let loaded = MeshVocabulary::load(dir.path());
        assert!(loaded.is_err());
    }
}
