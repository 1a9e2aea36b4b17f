//! Dialect-aware helpers: statement annotation, server capability rules,
//! and catalog introspection.

use crate::adapter::Adapter;
use crate::core::identifier;
use crate::core::table::{Column, Table};
use crate::error::{LhmError, Result};

/// Comment appended to every engine-issued statement, so engine traffic
/// can be identified in the processlist, slow log, and binlog.
pub const ANNOTATION: &str = "/* lhm */";

/// Dialect and catalog helpers over a database adapter.
pub struct SqlHelper<'a, A: Adapter> {
    adapter: &'a A,
}

impl<'a, A: Adapter> SqlHelper<'a, A> {
    /// Create a helper over an adapter.
    pub fn new(adapter: &'a A) -> Self {
        Self { adapter }
    }

    /// Server version as reported by `SELECT VERSION()`.
    pub async fn version_string(&self) -> Result<String> {
        let sql = format!("SELECT VERSION() {ANNOTATION}");
        self.adapter
            .query_string(&sql)
            .await?
            .ok_or_else(|| LhmError::db("server returned no version", None))
    }

    /// Whether the server supports swapping two tables in a single
    /// multi-table `RENAME TABLE`. `None` when the version string cannot
    /// be parsed.
    pub async fn supports_atomic_switch(&self) -> Result<Option<bool>> {
        Ok(atomic_switch_supported(&self.version_string().await?))
    }

    /// Whether a table exists in the catalog.
    pub async fn table_exists(&self, table: &Table) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' {ANNOTATION}",
            identifier::literal(&table.schema),
            identifier::literal(&table.name),
        );
        Ok(self.adapter.query_i64(&sql).await?.unwrap_or(0) > 0)
    }

    /// Columns of a table, in declared order.
    pub async fn columns(&self, table: &Table) -> Result<Vec<Column>> {
        let sql = format!(
            "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION {ANNOTATION}",
            identifier::literal(&table.schema),
            identifier::literal(&table.name),
        );
        let rows = self.adapter.query_string_pairs(&sql).await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type)| Column::new(name, data_type))
            .collect())
    }

    /// The single-column integer primary key of a table.
    ///
    /// The chunker's range arithmetic depends on this shape, so a
    /// missing, composite, or non-integer key is a precondition failure.
    pub async fn extract_primary_key(&self, table: &Table) -> Result<Column> {
        let sql = format!(
            "SELECT kcu.COLUMN_NAME, c.DATA_TYPE \
             FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
             JOIN INFORMATION_SCHEMA.COLUMNS c \
               ON c.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
              AND c.TABLE_NAME = kcu.TABLE_NAME \
              AND c.COLUMN_NAME = kcu.COLUMN_NAME \
             WHERE kcu.TABLE_SCHEMA = '{}' AND kcu.TABLE_NAME = '{}' \
               AND kcu.CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY kcu.ORDINAL_POSITION {ANNOTATION}",
            identifier::literal(&table.schema),
            identifier::literal(&table.name),
        );
        let mut rows = self.adapter.query_string_pairs(&sql).await?;

        match rows.len() {
            0 => Err(LhmError::precondition(
                &table.name,
                "table has no primary key",
            )),
            1 => {
                let (name, data_type) = rows.remove(0);
                let column = Column::new(name, data_type);
                if !column.is_integer() {
                    return Err(LhmError::precondition(
                        &table.name,
                        format!(
                            "primary key `{}` has non-integer type `{}`",
                            column.name, column.data_type
                        ),
                    ));
                }
                Ok(column)
            }
            n => Err(LhmError::precondition(
                &table.name,
                format!("composite primary key ({n} columns) is not supported"),
            )),
        }
    }
}

/// Capability rule for the single-statement table swap.
///
/// Multi-table `RENAME TABLE` was broken on servers before 4.2,
/// 5.0.52, and 5.1.23 (MySQL bug #39675). Returns `None` when the
/// version string does not start with a parseable version number.
pub fn atomic_switch_supported(version: &str) -> Option<bool> {
    let numeric: String = version
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric.split('.').filter(|s| !s.is_empty());

    let major: u64 = parts.next()?.parse().ok()?;
    let minor: Option<u64> = parts.next().and_then(|s| s.parse().ok());
    let tiny: Option<u64> = parts.next().and_then(|s| s.parse().ok());

    let supported = match (major, minor, tiny) {
        (4, Some(minor), _) if minor < 2 => false,
        (5, Some(0), Some(tiny)) if tiny < 52 => false,
        (5, Some(1), Some(tiny)) if tiny < 23 => false,
        _ => true,
    };

    Some(supported)
}
