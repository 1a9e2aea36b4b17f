//! # mysql-lhm
//!
//! Online schema change engine for MySQL/InnoDB-compatible servers.
//!
//! Alters a live table without a long exclusive write lock: the engine
//! builds a shadow table with the new shape, keeps it synchronized with
//! the origin through database-side triggers, back-fills existing rows
//! in bounded, throttled chunks, then atomically swaps the two tables.
//! The old table is kept under a timestamped archive name.
//!
//! - **Shadow lifecycle**: `CREATE TABLE ... LIKE`, mutate, rename
//! - **Entangler**: AFTER INSERT/UPDATE/DELETE triggers mirroring writes
//! - **Chunker**: primary-key-range back-fill with throttling
//! - **Switcher**: atomic multi-table rename, or a locked fallback
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_lhm::{Invoker, MysqlAdapter, Options};
//!
//! #[tokio::main]
//! async fn main() -> mysql_lhm::Result<()> {
//!     let adapter = MysqlAdapter::connect("mysql://app@localhost:3306/app_db").await?;
//!     let invoker = Invoker::new(adapter, "app_db", "users", Options::default()).await?;
//!
//!     invoker
//!         .execute(|adapter, shadow| async move {
//!             adapter
//!                 .execute(&format!(
//!                     "ALTER TABLE {} ADD COLUMN `email` VARCHAR(255)",
//!                     shadow.qualified_name()
//!                 ))
//!                 .await?;
//!             Ok(())
//!         })
//!         .await
//! }
//! ```
//!
//! The origin table must have a single-column integer primary key; the
//! chunker's range arithmetic depends on it.

pub mod adapter;
pub mod chunker;
pub mod config;
pub mod core;
pub mod entangler;
pub mod error;
pub mod invoker;
pub mod sql_helper;
pub mod switcher;

// Re-exports for convenient access
pub use crate::adapter::{Adapter, MysqlAdapter};
pub use crate::chunker::Chunker;
pub use crate::config::Options;
pub use crate::core::intersection::Intersection;
pub use crate::core::table::{Column, Table};
pub use crate::entangler::Entangler;
pub use crate::error::{LhmError, Phase, Result};
pub use crate::invoker::Invoker;
pub use crate::sql_helper::{SqlHelper, ANNOTATION};
pub use crate::switcher::{AtomicSwitcher, Clock, LockedSwitcher, Switcher, SystemClock};
