//! Relational schema inference
//!
//! This module infers normalized tables from repeated-element patterns across a
//! corpus, together with a numeric/text type and width for every column.

pub mod dialect;
pub mod frozen;
pub mod inferer;
pub mod variable_type;

pub use dialect::Dialect;
pub use frozen::{Column, Schema, TableLayout, TableSchema};
pub use inferer::{infer_schema, SchemaInferer};
pub use variable_type::VariableType;
