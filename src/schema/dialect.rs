use crate::error::MeltError;
use crate::schema::VariableType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Storage dialect whose native types columns are mapped to.
///
/// Chosen once when a store is built; the mapping itself is a pure function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    MsSql,
    PostgreSql,
    Sqlite,
}

impl Dialect {
    pub fn map_type(self, ty: &VariableType) -> &'static str {
        match (self, ty.is_numeric) {
            (Dialect::MySql, true) => "INT",
            (Dialect::MsSql | Dialect::PostgreSql, true) if ty.max_width < 10 => "INT",
            (Dialect::MsSql | Dialect::PostgreSql, true) => "BIGINT",
            (Dialect::Sqlite, true) => "INTEGER",
            (Dialect::Sqlite, false) => "TEXT",
            (_, false) if ty.max_width <= 255 => "VARCHAR(255)",
            (Dialect::MsSql, false) => "VARCHAR(MAX)",
            (Dialect::MySql | Dialect::PostgreSql, false) => "TEXT",
        }
    }
}

impl FromStr for Dialect {
    type Err = MeltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "mssql" => Ok(Dialect::MsSql),
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(MeltError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}
