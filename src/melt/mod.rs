//! Document melting - split nested documents into keyed relational rows
//!
//! This module takes a frozen table layout and turns each document into rows
//! for those tables, carrying the document's natural key and one order column
//! per enclosing repeated element. The [`IngestCoordinator`] pushes the rows to
//! a sink, replacing whatever an earlier version of the document left behind.

pub mod decomposer;
pub mod identifier;
pub mod ingest;
pub mod row;

pub use decomposer::RecordDecomposer;
pub use identifier::find_document_key;
pub use ingest::{IngestCoordinator, IngestReport, IngestStats};
pub use row::{Decomposition, DocumentKey, Row, SchemaDrift};
