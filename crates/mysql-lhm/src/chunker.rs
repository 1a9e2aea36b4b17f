//! Bounded-range back-fill of pre-existing origin rows.
//!
//! Copies by primary-key range rather than OFFSET so each chunk costs the
//! same regardless of table size and is unaffected by rows shifting under
//! concurrent writes. The upper bound is frozen at run start: rows
//! inserted after that moment are already mirrored by the triggers, so
//! chasing them would be unbounded work. `INSERT IGNORE` because a
//! trigger-mirrored write is newer than what the chunk read from the
//! origin; on a primary-key collision the chunker's copy loses.

use std::time::Duration;

use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::config::Options;
use crate::core::identifier;
use crate::core::intersection::Intersection;
use crate::core::table::Table;
use crate::error::{Phase, Result};
use crate::sql_helper::ANNOTATION;

/// Upper bound of the chunk starting at `lo`, saturating at `end`.
pub(crate) fn chunk_upper_bound(lo: i64, stride: u64, end: i64) -> i64 {
    lo.saturating_add(stride as i64 - 1).min(end)
}

/// Copies rows that existed before trigger installation into the shadow.
pub struct Chunker<'a, A: Adapter> {
    adapter: &'a A,
    origin: &'a Table,
    shadow: &'a Table,
    intersection: &'a Intersection,
    pk_column: &'a str,
    stride: u64,
    throttle: Duration,
}

impl<'a, A: Adapter> Chunker<'a, A> {
    /// Create a chunker with the stride and throttle from `options`.
    pub fn new(
        adapter: &'a A,
        origin: &'a Table,
        shadow: &'a Table,
        intersection: &'a Intersection,
        pk_column: &'a str,
        options: &Options,
    ) -> Self {
        Self {
            adapter,
            origin,
            shadow,
            intersection,
            pk_column,
            stride: options.stride,
            throttle: options.throttle(),
        }
    }

    /// Run the back-fill loop. A no-op when the origin is empty.
    pub async fn run(&self) -> Result<()> {
        let Some((start, end)) = self.select_bounds().await? else {
            debug!(table = %self.origin.name, "origin is empty, nothing to back-fill");
            return Ok(());
        };

        info!(
            table = %self.origin.name,
            start,
            end,
            stride = self.stride,
            "back-filling shadow table"
        );

        let mut lo = start;
        let mut chunks = 0u64;
        loop {
            let hi = chunk_upper_bound(lo, self.stride, end);
            let sql = self.copy_chunk_sql(lo, hi);
            self.adapter
                .execute(&sql)
                .await
                .map_err(|e| e.in_phase(Phase::Chunk, &self.origin.name))?;
            chunks += 1;
            debug!(lo, hi, "copied chunk");

            if hi == end {
                break;
            }
            lo = hi + 1;

            if !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }

        info!(table = %self.origin.name, chunks, "back-fill complete");
        Ok(())
    }

    /// The primary-key bounds of the rows to copy, frozen for the run.
    async fn select_bounds(&self) -> Result<Option<(i64, i64)>> {
        let pk = identifier::quote(self.pk_column);
        let sql = format!(
            "SELECT MIN({pk}), MAX({pk}) FROM {origin} {ANNOTATION}",
            origin = self.origin.qualified_name(),
        );
        let bounds = self
            .adapter
            .query_i64_pair(&sql)
            .await
            .map_err(|e| e.in_phase(Phase::Chunk, &self.origin.name))?;

        match bounds {
            Some((Some(min), Some(max))) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    fn copy_chunk_sql(&self, lo: i64, hi: i64) -> String {
        let columns = self.intersection.quoted_list();
        let pk = identifier::quote(self.pk_column);
        format!(
            "INSERT IGNORE INTO {shadow} ({columns}) \
             SELECT {columns} FROM {origin} \
             WHERE {origin}.{pk} BETWEEN {lo} AND {hi} {ANNOTATION}",
            shadow = self.shadow.qualified_name(),
            origin = self.origin.qualified_name(),
        )
    }
}
