//! Database adapter contract.
//!
//! The engine issues exactly one statement at a time and consumes results
//! in a handful of scalar shapes, so the contract stays narrow: execute a
//! statement, or fetch the first row as typed scalars. Everything
//! dialect-specific (quoting, introspection SQL, capability rules) lives
//! above this seam in [`crate::sql_helper`].

mod mysql;

pub use mysql::MysqlAdapter;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;

/// Minimal database surface the engine runs against.
///
/// Implementations must route all calls through a single session:
/// `SET SESSION` statements issued early in a run have to apply to the
/// connection that later executes chunks and the cutover rename.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// First column of the first row, as an integer.
    async fn query_i64(&self, sql: &str) -> Result<Option<i64>>;

    /// First two columns of the first row, as nullable integers.
    ///
    /// Shaped for `SELECT MIN(pk), MAX(pk)`, which returns a row of two
    /// NULLs on an empty table.
    async fn query_i64_pair(&self, sql: &str) -> Result<Option<(Option<i64>, Option<i64>)>>;

    /// First column of the first row, as text.
    async fn query_string(&self, sql: &str) -> Result<Option<String>>;

    /// First two columns of every row, as text.
    async fn query_string_pairs(&self, sql: &str) -> Result<Vec<(String, String)>>;
}
