//! Error types shared by the inference, decomposition and ingestion layers

use thiserror::Error;

/// Errors raised by the library.
///
/// Schema drift is deliberately absent: a field unknown to the frozen schema is
/// dropped and reported through [`crate::melt::SchemaDrift`], never as an error.
#[derive(Error, Debug)]
pub enum MeltError {
    /// The document carries no natural id / version pair
    #[error("document has no {element} element with a {attribute} attribute")]
    MissingIdentifier { element: String, attribute: String },

    /// A repeated child maps to a table the frozen schema does not know
    #[error("repeated element would form table '{table}', which is not in the schema")]
    UnknownTableBoundary { table: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog or data sink failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Misuse of the prefetch pipeline handoff protocol
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl From<rusqlite::Error> for MeltError {
    fn from(e: rusqlite::Error) -> Self {
        MeltError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for MeltError {
    fn from(e: serde_json::Error) -> Self {
        MeltError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MeltError>;
