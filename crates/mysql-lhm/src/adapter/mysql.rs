//! MySQL adapter backed by `mysql_async`.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts};
use tokio::sync::Mutex;
use tracing::info;

use crate::adapter::Adapter;
use crate::error::{LhmError, Result};

/// Adapter pinned to a single MySQL session.
///
/// The engine is single-threaded cooperative, so one connection behind a
/// mutex is all the concurrency this needs. Pinning matters for
/// correctness: the session lock-wait timeouts set at the start of a run
/// must govern the same connection that later runs the chunk copies and
/// the cutover rename.
pub struct MysqlAdapter {
    conn: Mutex<Conn>,
}

impl MysqlAdapter {
    /// Connect to the server given a `mysql://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = Opts::from_url(url)
            .map_err(|e| LhmError::Config(format!("invalid MySQL URL: {e}")))?;
        let conn = Conn::new(opts).await?;

        info!("Connected to MySQL server");

        Ok(Self::from_conn(conn))
    }

    /// Wrap an already established connection.
    pub fn from_conn(conn: Conn) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Close the connection.
    pub async fn disconnect(self) -> Result<()> {
        self.conn.into_inner().disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for MysqlAdapter {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }

    async fn query_i64(&self, sql: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.lock().await;
        Ok(conn.query_first::<i64, _>(sql).await?)
    }

    async fn query_i64_pair(&self, sql: &str) -> Result<Option<(Option<i64>, Option<i64>)>> {
        let mut conn = self.conn.lock().await;
        Ok(conn
            .query_first::<(Option<i64>, Option<i64>), _>(sql)
            .await?)
    }

    async fn query_string(&self, sql: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock().await;
        Ok(conn.query_first::<String, _>(sql).await?)
    }

    async fn query_string_pairs(&self, sql: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.conn.lock().await;
        Ok(conn.query::<(String, String), _>(sql).await?)
    }
}
