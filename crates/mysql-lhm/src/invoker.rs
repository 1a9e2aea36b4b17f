//! Top-level orchestrator: shadow lifecycle, session setup, and the
//! entangle → chunk → switch sequence.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::chunker::Chunker;
use crate::config::Options;
use crate::core::identifier;
use crate::core::intersection::Intersection;
use crate::core::table::Table;
use crate::entangler::{self, Entangler};
use crate::error::{LhmError, Phase, Result};
use crate::sql_helper::{SqlHelper, ANNOTATION};
use crate::switcher::{Clock, Switcher, SystemClock};

/// The engine must hit its own lock-wait timeout before the server's
/// global one fires, so contention surfaces as a retryable engine error
/// rather than a hard server error.
const GLOBAL_TIMEOUT_MARGIN: i64 = 2;

/// Cap on the session lock-wait timeout, guarding against pathological
/// global settings.
const SESSION_TIMEOUT_CAP: i64 = 100;

/// Orchestrates a schema change run against one origin table.
pub struct Invoker<A: Adapter> {
    adapter: Arc<A>,
    origin: Table,
    options: Options,
    clock: Arc<dyn Clock>,
}

impl<A: Adapter> std::fmt::Debug for Invoker<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("origin", &self.origin)
            .field("options", &self.options)
            .finish()
    }
}

impl<A: Adapter> Invoker<A> {
    /// Create an invoker for an origin table.
    ///
    /// Validates the options and identifiers and checks that the origin
    /// exists; all other preconditions are checked by [`execute`].
    ///
    /// [`execute`]: Invoker::execute
    pub async fn new(
        adapter: impl Into<Arc<A>>,
        schema: &str,
        table: &str,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;
        identifier::validate(schema)?;
        identifier::validate(table)?;
        // The shadow name must also fit the identifier limit.
        identifier::validate(&format!("{table}{}", options.temporary_table_suffix))?;

        let adapter = adapter.into();
        let origin = Table::new(schema, table);

        let helper = SqlHelper::new(&*adapter);
        if !helper.table_exists(&origin).await? {
            return Err(LhmError::precondition(table, "origin table does not exist"));
        }

        Ok(Self {
            adapter,
            origin,
            options,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the wall-clock source used for archive naming.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The origin table this invoker migrates.
    pub fn origin(&self) -> &Table {
        &self.origin
    }

    /// The shadow table name this run will use.
    pub fn shadow_table(&self) -> Table {
        Table::new(
            &self.origin.schema,
            format!("{}{}", self.origin.name, self.options.temporary_table_suffix),
        )
    }

    /// Run a schema change.
    ///
    /// The callback receives the adapter and the table it should mutate:
    /// the shadow in the normal path, the origin itself when the
    /// `entangler` option is off.
    pub async fn execute<F, Fut>(&self, migration: F) -> Result<()>
    where
        F: FnOnce(Arc<A>, Table) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !self.options.entangler {
            debug!(table = %self.origin.name, "running migration in place, no shadow copy");
            return migration(Arc::clone(&self.adapter), self.origin.clone())
                .await
                .map_err(|e| e.in_phase(Phase::MigrateCallback, &self.origin.name));
        }

        let helper = SqlHelper::new(&*self.adapter);
        let atomic = self.resolve_switch_strategy(&helper).await?;
        let shadow = self.shadow_table();

        info!(
            origin = %self.origin.name,
            shadow = %shadow.name,
            atomic,
            "starting online schema change"
        );

        self.create_shadow_table(&helper, &shadow).await?;
        self.configure_session_timeouts().await?;

        migration(Arc::clone(&self.adapter), shadow.clone())
            .await
            .map_err(|e| e.in_phase(Phase::MigrateCallback, &self.origin.name))?;

        // Freeze the copy projection now that the shadow has its final
        // shape.
        let origin_columns = helper.columns(&self.origin).await?;
        let shadow_columns = helper.columns(&shadow).await?;
        let intersection = Intersection::of(&origin_columns, &shadow_columns);
        if intersection.is_empty() {
            return Err(LhmError::precondition(
                &self.origin.name,
                "origin and shadow share no columns after the migration",
            ));
        }
        let pk = helper.extract_primary_key(&self.origin).await?;

        let adapter = &*self.adapter;
        let entangler = Entangler::new(adapter, &self.origin, &shadow, &intersection, &pk.name);
        let chunker = Chunker::new(
            adapter,
            &self.origin,
            &shadow,
            &intersection,
            &pk.name,
            &self.options,
        );
        let switcher = Switcher::new(
            atomic,
            adapter,
            &self.origin,
            &shadow,
            &self.options,
            &*self.clock,
        );

        entangler
            .run(async {
                chunker.run().await?;
                switcher.run().await?;
                Ok(())
            })
            .await?;

        info!(table = %self.origin.name, "online schema change complete");
        Ok(())
    }

    /// Drop the engine's triggers and, when `drop_shadow`, the shadow
    /// table. Recovery path after a run aborted by the operator; a
    /// normal run cleans up after itself.
    pub async fn cleanup(&self, drop_shadow: bool) -> Result<()> {
        for name in entangler::trigger_names(&self.origin.name) {
            let sql = format!(
                "DROP TRIGGER IF EXISTS {} {ANNOTATION}",
                identifier::qualify(&self.origin.schema, &name)
            );
            self.adapter
                .execute(&sql)
                .await
                .map_err(|e| e.in_phase(Phase::Entangle, &self.origin.name))?;
        }

        if drop_shadow {
            let shadow = self.shadow_table();
            let sql = format!(
                "DROP TABLE IF EXISTS {} {ANNOTATION}",
                shadow.qualified_name()
            );
            self.adapter
                .execute(&sql)
                .await
                .map_err(|e| e.in_phase(Phase::ShadowCreate, &self.origin.name))?;
        }

        Ok(())
    }

    /// Decide between the atomic rename and the locked fallback.
    async fn resolve_switch_strategy(&self, helper: &SqlHelper<'_, A>) -> Result<bool> {
        match self.options.atomic_switch {
            Some(true) => {
                if helper.supports_atomic_switch().await? == Some(false) {
                    return Err(LhmError::precondition(
                        &self.origin.name,
                        "atomic cutover requested but this server's multi-table rename is broken",
                    ));
                }
                Ok(true)
            }
            Some(false) => Ok(false),
            None => match helper.supports_atomic_switch().await? {
                Some(supported) => Ok(supported),
                None => Err(LhmError::precondition(
                    &self.origin.name,
                    "cannot determine atomic-rename support from the server version; \
                     set the atomic_switch option explicitly",
                )),
            },
        }
    }

    async fn create_shadow_table(&self, helper: &SqlHelper<'_, A>, shadow: &Table) -> Result<()> {
        if helper.table_exists(shadow).await? {
            return Err(LhmError::precondition(
                &self.origin.name,
                format!(
                    "shadow table `{}` already exists; another migration may be in flight \
                     (drop it to recover from an aborted run)",
                    shadow.name
                ),
            ));
        }

        let sql = format!(
            "CREATE TABLE {shadow} LIKE {origin} {ANNOTATION}",
            shadow = shadow.qualified_name(),
            origin = self.origin.qualified_name(),
        );
        self.adapter
            .execute(&sql)
            .await
            .map_err(|e| e.in_phase(Phase::ShadowCreate, &self.origin.name))?;
        Ok(())
    }

    /// Lower the session lock-wait timeouts below the server's global
    /// ones. Variables the server does not expose (older versions lack
    /// `lock_wait_timeout`) are skipped.
    async fn configure_session_timeouts(&self) -> Result<()> {
        for variable in ["innodb_lock_wait_timeout", "lock_wait_timeout"] {
            let show = format!("SHOW GLOBAL VARIABLES LIKE '{variable}' {ANNOTATION}");
            let rows = self
                .adapter
                .query_string_pairs(&show)
                .await
                .map_err(|e| e.in_phase(Phase::Session, &self.origin.name))?;

            let Some((_, value)) = rows.into_iter().next() else {
                debug!(variable, "server does not expose variable, skipping");
                continue;
            };
            let Ok(global) = value.parse::<i64>() else {
                debug!(variable, value, "global value is not numeric, skipping");
                continue;
            };

            let session = (global - GLOBAL_TIMEOUT_MARGIN).min(SESSION_TIMEOUT_CAP).max(1);
            let set = format!("SET SESSION {variable} = {session} {ANNOTATION}");
            self.adapter
                .execute(&set)
                .await
                .map_err(|e| e.in_phase(Phase::Session, &self.origin.name))?;
            debug!(variable, global, session, "lowered session lock-wait timeout");
        }

        Ok(())
    }
}
