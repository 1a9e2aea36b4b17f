//! Trigger bracket that mirrors origin writes into the shadow table.
//!
//! Three `AFTER ... FOR EACH ROW` triggers cover the write paths:
//! INSERT and UPDATE mirror the intersection columns with `REPLACE INTO`,
//! DELETE removes the shadow row with `DELETE IGNORE`. `REPLACE` rather
//! than `INSERT` because a back-fill chunk and a live write can race on
//! the same primary key; the trigger fires inside the origin statement
//! and must win. `IGNORE` on the delete side tolerates rows the chunker
//! has not copied yet.

use std::future::Future;

use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::core::identifier;
use crate::core::intersection::Intersection;
use crate::core::table::Table;
use crate::error::{LhmError, Phase, Result};
use crate::sql_helper::ANNOTATION;

/// Deterministic names of the three mirror triggers for an origin table.
///
/// Stale triggers with these names (left by an aborted run) are dropped
/// and replaced on the next install.
pub fn trigger_names(origin_table: &str) -> [String; 3] {
    [
        format!("lhmt_ins_{origin_table}"),
        format!("lhmt_upd_{origin_table}"),
        format!("lhmt_del_{origin_table}"),
    ]
}

/// Brackets an inner operation with the mirror triggers installed.
pub struct Entangler<'a, A: Adapter> {
    adapter: &'a A,
    origin: &'a Table,
    shadow: &'a Table,
    intersection: &'a Intersection,
    pk_column: &'a str,
}

impl<'a, A: Adapter> Entangler<'a, A> {
    /// Create an entangler over a frozen column intersection.
    pub fn new(
        adapter: &'a A,
        origin: &'a Table,
        shadow: &'a Table,
        intersection: &'a Intersection,
        pk_column: &'a str,
    ) -> Self {
        Self {
            adapter,
            origin,
            shadow,
            intersection,
            pk_column,
        }
    }

    /// The trigger names this entangler installs.
    pub fn expected_triggers(&self) -> [String; 3] {
        trigger_names(&self.origin.name)
    }

    /// Install the triggers, await `inner`, then drop the triggers.
    ///
    /// Teardown runs on both the success and the failure path. A
    /// teardown failure after an inner failure is logged and the inner
    /// error is returned; after an inner success it surfaces as the
    /// run's error, since triggers left behind are never acceptable.
    pub async fn run<T, Fut>(&self, inner: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.install().await?;

        let result = inner.await;

        if let Err(teardown_err) = self.teardown().await {
            match result {
                Ok(_) => return Err(teardown_err),
                Err(inner_err) => {
                    warn!(
                        error = %teardown_err,
                        "trigger teardown failed while handling an earlier error"
                    );
                    return Err(inner_err);
                }
            }
        }

        result
    }

    /// Drop all three triggers, attempting every one even after a failure.
    pub async fn teardown(&self) -> Result<()> {
        let mut first_err: Option<LhmError> = None;

        for name in self.expected_triggers() {
            if let Err(err) = self.drop_trigger(&name).await {
                warn!(trigger = %name, error = %err, "failed to drop trigger");
                first_err.get_or_insert(err.in_phase(Phase::Entangle, &self.origin.name));
            } else {
                debug!(trigger = %name, "dropped trigger");
            }
        }

        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn install(&self) -> Result<()> {
        let mut installed: Vec<String> = Vec::new();

        for (name, create_sql) in self.trigger_definitions() {
            let result = async {
                // A same-named trigger left by an aborted run is replaced.
                self.drop_trigger(&name).await?;
                self.adapter.execute(&create_sql).await?;
                Ok::<_, LhmError>(())
            }
            .await;

            if let Err(err) = result {
                // Partial install: remove only what this run created.
                for name in &installed {
                    if let Err(drop_err) = self.drop_trigger(name).await {
                        warn!(trigger = %name, error = %drop_err, "failed to drop trigger during install rollback");
                    }
                }
                return Err(err.in_phase(Phase::Entangle, &self.origin.name));
            }

            debug!(trigger = %name, "installed trigger");
            installed.push(name);
        }

        Ok(())
    }

    fn trigger_definitions(&self) -> [(String, String); 3] {
        let [ins, upd, del] = self.expected_triggers();
        [
            (ins.clone(), self.mirror_trigger_sql(&ins, "INSERT")),
            (upd.clone(), self.mirror_trigger_sql(&upd, "UPDATE")),
            (del.clone(), self.delete_trigger_sql(&del)),
        ]
    }

    /// `REPLACE INTO` mirror used for both the INSERT and UPDATE paths.
    fn mirror_trigger_sql(&self, name: &str, event: &str) -> String {
        format!(
            "CREATE TRIGGER {trigger} AFTER {event} ON {origin} FOR EACH ROW \
             REPLACE INTO {shadow} ({columns}) VALUES ({values}) {ANNOTATION}",
            trigger = identifier::qualify(&self.origin.schema, name),
            origin = self.origin.qualified_name(),
            shadow = self.shadow.qualified_name(),
            columns = self.intersection.quoted_list(),
            values = self.intersection.new_value_list(),
        )
    }

    fn delete_trigger_sql(&self, name: &str) -> String {
        let pk = identifier::quote(self.pk_column);
        format!(
            "CREATE TRIGGER {trigger} AFTER DELETE ON {origin} FOR EACH ROW \
             DELETE IGNORE FROM {shadow} WHERE {shadow}.{pk} = OLD.{pk} {ANNOTATION}",
            trigger = identifier::qualify(&self.origin.schema, name),
            origin = self.origin.qualified_name(),
            shadow = self.shadow.qualified_name(),
        )
    }

    async fn drop_trigger(&self, name: &str) -> Result<()> {
        let sql = format!(
            "DROP TRIGGER IF EXISTS {} {ANNOTATION}",
            identifier::qualify(&self.origin.schema, name)
        );
        self.adapter.execute(&sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::MockAdapter;
    use crate::core::table::Column;

    fn fixture() -> (Table, Table, Intersection) {
        let origin = Table::new("app_db", "users");
        let shadow = Table::new("app_db", "users_new");
        let columns = vec![Column::new("id", "int"), Column::new("name", "varchar")];
        let intersection = Intersection::of(&columns, &columns);
        (origin, shadow, intersection)
    }

    #[tokio::test]
    async fn run_installs_then_tears_down() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        let value = entangler.run(async { Ok::<_, LhmError>(42) }).await.unwrap();
        assert_eq!(value, 42);

        let statements = adapter.executed();
        // Stale-drop + create per trigger, then the three teardown drops.
        assert_eq!(statements.len(), 9);
        assert_eq!(adapter.count_matching("CREATE TRIGGER"), 3);
        assert_eq!(adapter.count_matching("DROP TRIGGER IF EXISTS"), 6);

        // Every create is preceded by the stale-state drop of the same name.
        assert!(statements[0].contains("DROP TRIGGER IF EXISTS `app_db`.`lhmt_ins_users`"));
        assert!(statements[1].contains("CREATE TRIGGER `app_db`.`lhmt_ins_users`"));
        assert!(statements[8].contains("DROP TRIGGER IF EXISTS `app_db`.`lhmt_del_users`"));
    }

    #[tokio::test]
    async fn insert_and_update_triggers_replace_into_the_shadow() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        entangler.run(async { Ok::<_, LhmError>(()) }).await.unwrap();

        let statements = adapter.executed();
        let insert = statements
            .iter()
            .find(|s| s.contains("CREATE TRIGGER") && s.contains("lhmt_ins_"))
            .unwrap();
        assert!(insert.contains("AFTER INSERT ON `app_db`.`users`"));
        assert!(insert.contains("FOR EACH ROW"));
        assert!(insert
            .contains("REPLACE INTO `app_db`.`users_new` (`id`, `name`) VALUES (NEW.`id`, NEW.`name`)"));
        assert!(insert.contains(ANNOTATION));

        let update = statements
            .iter()
            .find(|s| s.contains("CREATE TRIGGER") && s.contains("lhmt_upd_"))
            .unwrap();
        assert!(update.contains("AFTER UPDATE ON `app_db`.`users`"));
        assert!(update.contains("REPLACE INTO"));
    }

    #[tokio::test]
    async fn delete_trigger_removes_by_primary_key() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        entangler.run(async { Ok::<_, LhmError>(()) }).await.unwrap();

        let statements = adapter.executed();
        let delete = statements
            .iter()
            .find(|s| s.contains("CREATE TRIGGER") && s.contains("lhmt_del_"))
            .unwrap();
        assert!(delete.contains("AFTER DELETE ON `app_db`.`users`"));
        assert!(delete.contains(
            "DELETE IGNORE FROM `app_db`.`users_new` WHERE `app_db`.`users_new`.`id` = OLD.`id`"
        ));
    }

    #[tokio::test]
    async fn teardown_runs_when_inner_fails() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        let err = entangler
            .run(async { Err::<(), _>(LhmError::db("chunk exploded", None)) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chunk exploded"));

        // All three triggers still dropped after the failure.
        assert_eq!(adapter.count_matching("DROP TRIGGER IF EXISTS"), 6);
    }

    #[tokio::test]
    async fn inner_error_wins_over_teardown_error() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        // The stale-state drop at install time succeeds; the teardown
        // drop of the same trigger fails.
        adapter.fail_matching_after("DROP TRIGGER IF EXISTS `app_db`.`lhmt_upd_users`", None, 1, 1);

        let err = entangler
            .run(async { Err::<(), _>(LhmError::db("inner failure", None)) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("inner failure"));
    }

    #[tokio::test]
    async fn teardown_failure_after_success_is_an_error() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        adapter.fail_matching_after("DROP TRIGGER IF EXISTS `app_db`.`lhmt_del_users`", None, 1, 1);

        let err = entangler.run(async { Ok::<_, LhmError>(()) }).await.unwrap_err();
        assert!(matches!(
            err,
            LhmError::Phase {
                phase: Phase::Entangle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn partial_install_drops_only_installed_triggers() {
        let adapter = MockAdapter::new();
        let (origin, shadow, intersection) = fixture();
        let entangler = Entangler::new(&adapter, &origin, &shadow, &intersection, "id");

        adapter.fail_matching("CREATE TRIGGER `app_db`.`lhmt_upd_users`", None);

        let err = entangler.run(async { Ok::<_, LhmError>(()) }).await.unwrap_err();
        assert!(matches!(
            err,
            LhmError::Phase {
                phase: Phase::Entangle,
                ..
            }
        ));

        let statements = adapter.executed();
        // ins: drop + create; upd: drop + failed create; rollback: drop ins.
        assert_eq!(adapter.count_matching("CREATE TRIGGER"), 2);
        assert!(statements
            .last()
            .unwrap()
            .contains("DROP TRIGGER IF EXISTS `app_db`.`lhmt_ins_users`"));
        // The delete trigger was never touched.
        assert_eq!(adapter.count_matching("lhmt_del_users"), 0);
    }

    #[test]
    fn trigger_names_are_deterministic() {
        assert_eq!(
            trigger_names("users"),
            [
                "lhmt_ins_users".to_string(),
                "lhmt_upd_users".to_string(),
                "lhmt_del_users".to_string(),
            ]
        );
    }
}
