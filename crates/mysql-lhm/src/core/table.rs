//! Table and column metadata consumed by the engine.

use serde::{Deserialize, Serialize};

use crate::core::identifier;

/// Column metadata, as read from `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Base data type (`int`, `varchar`, ...), without length or modifiers.
    pub data_type: String,
}

impl Column {
    /// Create a column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Whether the column holds one of MySQL's integer types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.data_type.to_ascii_lowercase().as_str(),
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint"
        )
    }
}

/// A schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema (database) name.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl Table {
    /// Create a table reference.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// The schema-qualified, quoted form used in engine-issued SQL.
    pub fn qualified_name(&self) -> String {
        identifier::qualify(&self.schema, &self.name)
    }
}
