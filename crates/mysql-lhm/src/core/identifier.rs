//! Identifier validation and quoting for dynamically assembled SQL.
//!
//! Table, column, and trigger names cannot be passed as parameters in
//! prepared statements, so every name that ends up in engine-issued SQL
//! goes through the helpers here: validation at the API boundary, backtick
//! quoting at statement assembly time.

use crate::error::{LhmError, Result};

/// Maximum identifier length accepted by MySQL.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier before it is used in engine-issued SQL.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding MySQL's 64-character limit
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LhmError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(LhmError::Config(format!(
            "Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(LhmError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks, doubling embedded backticks.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Qualify a table-level name with its schema, quoting both parts.
pub fn qualify(schema: &str, name: &str) -> String {
    format!("{}.{}", quote(schema), quote(name))
}

/// Escape a value for use inside a single-quoted SQL string literal.
///
/// Used for schema and table names interpolated into
/// `INFORMATION_SCHEMA` lookups, where they appear as values rather
/// than identifiers.
pub fn literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}
