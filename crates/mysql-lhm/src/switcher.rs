//! Cutover strategies: the single-statement table swap and the locked
//! drop-rename fallback.
//!
//! Both variants share the retry policy: lock contention (lock-wait
//! timeout, deadlock victim) is retried with a short sleep up to the
//! configured ceiling; any other failure is fatal on the first attempt.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::config::Options;
use crate::core::identifier;
use crate::core::table::Table;
use crate::error::{LhmError, Phase, Result};
use crate::sql_helper::ANNOTATION;

/// Wall-clock source for archive-name timestamps.
pub trait Clock: Send + Sync {
    /// The current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cutover strategy selected at construction.
pub enum Switcher<'a, A: Adapter> {
    /// Single multi-table rename; no instant at which the origin name is
    /// unresolvable.
    Atomic(AtomicSwitcher<'a, A>),
    /// `LOCK TABLES` plus two single renames, for servers where the
    /// multi-table rename is broken or disabled.
    Locked(LockedSwitcher<'a, A>),
}

impl<'a, A: Adapter> Switcher<'a, A> {
    /// Select a strategy.
    pub fn new(
        atomic: bool,
        adapter: &'a A,
        origin: &'a Table,
        shadow: &'a Table,
        options: &'a Options,
        clock: &'a dyn Clock,
    ) -> Self {
        if atomic {
            Switcher::Atomic(AtomicSwitcher {
                adapter,
                origin,
                shadow,
                options,
                clock,
            })
        } else {
            Switcher::Locked(LockedSwitcher {
                adapter,
                origin,
                shadow,
                options,
                clock,
            })
        }
    }

    /// Perform the cutover, returning the archive table name.
    pub async fn run(&self) -> Result<String> {
        match self {
            Switcher::Atomic(s) => s.run().await,
            Switcher::Locked(s) => s.run().await,
        }
    }
}

/// Cutover via `RENAME TABLE origin TO archive, shadow TO origin`.
pub struct AtomicSwitcher<'a, A: Adapter> {
    adapter: &'a A,
    origin: &'a Table,
    shadow: &'a Table,
    options: &'a Options,
    clock: &'a dyn Clock,
}

impl<'a, A: Adapter> AtomicSwitcher<'a, A> {
    /// Perform the swap, returning the archive table name.
    pub async fn run(&self) -> Result<String> {
        let archive = archive_name(self.options, self.clock, self.origin)?;
        let sql = format!(
            "RENAME TABLE {origin} TO {archive_q}, {shadow} TO {origin} {ANNOTATION}",
            origin = self.origin.qualified_name(),
            archive_q = identifier::qualify(&self.origin.schema, &archive),
            shadow = self.shadow.qualified_name(),
        );

        with_cutover_retry(&self.origin.name, self.options, || async {
            self.adapter.execute(&sql).await?;
            Ok(())
        })
        .await
        .map_err(|e| e.in_phase(Phase::Switch, &self.origin.name))?;

        info!(table = %self.origin.name, archive = %archive, "cutover complete");
        Ok(archive)
    }
}

/// Fallback cutover under `LOCK TABLES`.
///
/// Between the two renames the origin name resolves to no table, so
/// concurrent queries against it fail for that interval; the write lock
/// keeps new writes out while in-flight writers drain.
pub struct LockedSwitcher<'a, A: Adapter> {
    adapter: &'a A,
    origin: &'a Table,
    shadow: &'a Table,
    options: &'a Options,
    clock: &'a dyn Clock,
}

impl<'a, A: Adapter> LockedSwitcher<'a, A> {
    /// Perform the locked swap, returning the archive table name.
    pub async fn run(&self) -> Result<String> {
        let archive = archive_name(self.options, self.clock, self.origin)?;

        with_cutover_retry(&self.origin.name, self.options, || self.attempt(&archive))
            .await
            .map_err(|e| e.in_phase(Phase::Switch, &self.origin.name))?;

        info!(table = %self.origin.name, archive = %archive, "cutover complete");
        Ok(archive)
    }

    async fn attempt(&self, archive: &str) -> Result<()> {
        self.adapter
            .execute(&format!(
                "LOCK TABLES {origin} WRITE, {shadow} WRITE {ANNOTATION}",
                origin = self.origin.qualified_name(),
                shadow = self.shadow.qualified_name(),
            ))
            .await?;

        let renames = self.renames(archive).await;

        // The unlock runs no matter how the renames went.
        let unlock = self
            .adapter
            .execute(&format!("UNLOCK TABLES {ANNOTATION}"))
            .await;

        renames?;
        unlock?;
        Ok(())
    }

    async fn renames(&self, archive: &str) -> Result<()> {
        let origin = self.origin.qualified_name();
        let archive_q = identifier::qualify(&self.origin.schema, archive);

        self.adapter
            .execute(&format!("ALTER TABLE {origin} RENAME TO {archive_q} {ANNOTATION}"))
            .await?;

        let promote = format!(
            "ALTER TABLE {shadow} RENAME TO {origin} {ANNOTATION}",
            shadow = self.shadow.qualified_name(),
        );
        if let Err(err) = self.adapter.execute(&promote).await {
            // Put the old table back under the origin name so reads
            // resume while the operator investigates.
            let restore = format!("ALTER TABLE {archive_q} RENAME TO {origin} {ANNOTATION}");
            if let Err(restore_err) = self.adapter.execute(&restore).await {
                warn!(
                    table = %self.origin.name,
                    error = %restore_err,
                    "failed to restore origin after aborted cutover"
                );
            }
            return Err(err);
        }

        Ok(())
    }
}

/// The archive table name: the configured override, or
/// `lhma_<utc timestamp>_<origin>`.
fn archive_name(options: &Options, clock: &dyn Clock, origin: &Table) -> Result<String> {
    let name = match &options.archive_name {
        Some(name) => name.clone(),
        None => format!(
            "lhma_{}_{}",
            clock.now_utc().format("%Y_%m_%d_%H_%M_%S"),
            origin.name
        ),
    };
    identifier::validate(&name)
        .map_err(|e| LhmError::precondition(&origin.name, format!("invalid archive name: {e}")))?;
    Ok(name)
}

/// Retry `attempt` while it fails on lock contention, sleeping
/// `retry_sleep_time` between attempts, up to `max_retries` attempts.
async fn with_cutover_retry<F, Fut>(origin: &str, options: &Options, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempts: u32 = 0;
    loop {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_lock_wait_timeout() => {
                attempts += 1;
                if attempts >= options.max_retries {
                    return Err(LhmError::SwitchRetriesExhausted {
                        table: origin.to_string(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                debug!(table = %origin, attempts, "cutover blocked on lock contention, retrying");
                tokio::time::sleep(options.retry_sleep()).await;
            }
            Err(err) => return Err(err),
        }
    }
}
