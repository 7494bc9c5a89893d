//! # medmelt - XML corpus to relational tables
//!
//! Infers a normalized relational schema from a corpus of nested XML documents
//! (MEDLINE citations by default) and splits every document into keyed rows for
//! that schema.
//!
//! ## Modules
//!
//! - **schema**: Infer tables, fields and column types from sample documents
//! - **melt**: Decompose documents into rows and ingest them with delete-then-insert
//! - **store**: Catalog and data sink traits with SQLite, JSON Lines and in-memory stores
//! - **closure**, **mesh**: MeSH vocabulary tables and the ancestor closure of its tree
//! - **source**, **pipeline**: Corpus files, decoded one ahead of the consumer
//!
//! ## Quick Start
//!
//! ```rust
//! use medmelt::{infer_schema, MeltConfig, Node, RecordDecomposer};
//!
//! let xml = r#"<MedlineCitation>
//!     <PMID Version="1">100</PMID>
//!     <AuthorList>
//!         <Author><LastName>Smith</LastName></Author>
//!         <Author><LastName>Jones</LastName></Author>
//!     </AuthorList>
//! </MedlineCitation>"#;
//! let doc = Node::parse_str(xml).unwrap();
//!
//! let schema = infer_schema(&[doc.clone()], MeltConfig::default());
//! assert!(schema.table("MedlineCitation_AuthorList_Author").is_some());
//!
//! let decomposer = RecordDecomposer::from_schema(&schema, MeltConfig::default());
//! let rows = decomposer.decompose(&doc).unwrap().rows;
//! // two author rows, then the citation row
//! assert_eq!(rows.len(), 3);
//! ```

use anyhow::Result;
use tracing::{info, warn};

pub mod closure;
pub mod config;
pub mod document;
pub mod error;
pub mod melt;
pub mod mesh;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{MeltConfig, Settings};
pub use document::Node;
pub use error::MeltError;
pub use melt::{IngestCoordinator, IngestStats, RecordDecomposer, Row};
pub use schema::{infer_schema, Dialect, Schema, SchemaInferer, TableLayout, VariableType};
pub use source::CorpusSource;
pub use store::{Catalog, DataSink};

/// Infer a schema over every document of every file in the source.
///
/// A file that cannot be read or parsed is logged and skipped.
pub fn analyse_corpus(source: &CorpusSource, config: MeltConfig) -> Result<Schema> {
    let root = config.root_table.clone();
    let mut inferer = SchemaInferer::new(config);

    for (path, file) in source.documents() {
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                continue;
            }
        };
        let documents = file.descendants_named(&root);
        let total = documents.len();
        for (i, document) in documents.into_iter().enumerate() {
            inferer.observe(document);
            if i % 10_000 == 0 && i != 0 {
                info!("{} of {} documents", i, total);
            }
        }
    }

    info!(documents = inferer.documents_seen(), "analysis done");
    Ok(inferer.finish())
}

/// Ingest every file in the source through the coordinator
pub fn ingest_corpus<S: DataSink>(
    source: &CorpusSource,
    coordinator: &mut IngestCoordinator<S>,
) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    for (path, file) in source.documents() {
        match file {
            Ok(file) => stats += coordinator.ingest_file(&file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                stats.failed += 1;
            }
        }
        coordinator.flush()?;
    }
    Ok(stats)
}
