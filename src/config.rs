//! Naming conventions for the core and TOML settings for the front ends

use crate::error::{MeltError, Result};
use crate::schema::Dialect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Naming conventions used when inferring and decomposing documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeltConfig {
    /// Table that holds one row per document, e.g. "MedlineCitation"
    pub root_table: String,

    /// Element carrying the document's natural id, e.g. "PMID"
    pub id_element: String,

    /// Attribute of the id element carrying the version
    pub version_attribute: String,

    /// Element listing ids whose documents must be removed
    pub deletion_element: String,

    /// Separator for nested table and field names
    pub separator: String,

    /// Suffix of the per-level order columns
    pub order_suffix: String,

    /// Column name used for a table's own text value
    pub value_field: String,
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            root_table: String::from("MedlineCitation"),
            id_element: String::from("PMID"),
            version_attribute: String::from("Version"),
            deletion_element: String::from("DeleteCitation"),
            separator: String::from("_"),
            order_suffix: String::from("_Order"),
            value_field: String::from("Value"),
        }
    }
}

impl MeltConfig {
    /// Width reserved for injected order columns
    pub const ORDER_WIDTH: usize = 3;
    /// Width reserved for the natural id column
    pub const ID_WIDTH: usize = 8;
    /// Width reserved for the version column
    pub const VERSION_WIDTH: usize = 1;

    /// Join a prefix and a name, skipping the separator when the prefix is empty
    pub fn concatenate(&self, prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", prefix, self.separator, name)
        }
    }

    /// Fully qualified column path of `field` in `table`.
    ///
    /// The table's own value (empty field) maps to the table path itself, so a
    /// value folded into a parent as `X` and a value stored in sub-table `T_X`
    /// share one path.
    pub fn column_path(&self, table: &str, field: &str) -> String {
        if field.is_empty() {
            table.to_string()
        } else {
            self.concatenate(table, field)
        }
    }

    /// True when `prefix` is `path` itself or one of its ancestors, segment-wise
    pub fn is_path_prefix(&self, prefix: &str, path: &str) -> bool {
        match path.strip_prefix(prefix) {
            Some("") => true,
            Some(rest) => rest.starts_with(self.separator.as_str()),
            None => false,
        }
    }

    pub fn id_column(&self) -> &str {
        &self.id_element
    }

    pub fn version_column(&self) -> String {
        self.concatenate(&self.id_element, &self.version_attribute)
    }

    pub fn order_column(&self, table: &str) -> String {
        format!("{}{}", table, self.order_suffix)
    }

    pub fn is_order_column(&self, field: &str) -> bool {
        field.ends_with(self.order_suffix.as_str())
    }

    /// Name under which a field is stored; the empty field becomes the value placeholder
    pub fn stored_name<'a>(&'a self, field: &'a str) -> &'a str {
        if field.is_empty() {
            &self.value_field
        } else {
            field
        }
    }
}

/// Where the input corpus lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub xml_folder: PathBuf,
    /// Upper bound on files randomly sampled for schema analysis
    pub max_files_to_analyse: usize,
    /// Seed for the analysis sample; random when absent
    pub seed: Option<u64>,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        CorpusSettings {
            xml_folder: PathBuf::from("."),
            max_files_to_analyse: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Jsonl,
}

/// Where rows and the schema go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Database file (sqlite) or output directory (jsonl)
    pub path: PathBuf,
    pub dialect: Dialect,
    /// Shorten table and column names at the store boundary
    pub abbreviate: bool,
    pub batch_size: usize,
    /// Frozen schema written by the analyser
    pub schema_file: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            kind: StoreKind::Sqlite,
            path: PathBuf::from("medline.db"),
            dialect: Dialect::Sqlite,
            abbreviate: true,
            batch_size: 1000,
            schema_file: PathBuf::from("schema.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    pub folder: PathBuf,
}

/// Settings file shared by the binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub melt: MeltConfig,
    pub corpus: CorpusSettings,
    pub store: StoreSettings,
    pub mesh: MeshSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|e| MeltError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(contents).map_err(|e| MeltError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.melt.separator.is_empty() {
            return Err(MeltError::Config("separator must not be empty".into()));
        }
        if self.store.batch_size == 0 {
            return Err(MeltError::Config("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}
