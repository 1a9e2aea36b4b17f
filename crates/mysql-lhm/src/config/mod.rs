//! Engine options.
//!
//! Callers construct `Options` directly or deserialize it from whatever
//! configuration source they use; every field has a serde default, so a
//! partial document only names what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::identifier;
use crate::error::{LhmError, Result};

fn default_stride() -> u64 {
    2000
}

fn default_throttle_ms() -> u64 {
    100
}

fn default_retry_sleep_time_ms() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    600
}

fn default_temporary_table_suffix() -> String {
    "_new".to_string()
}

fn default_true() -> bool {
    true
}

/// Tunables for a schema change run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Maximum rows copied per back-fill chunk.
    #[serde(default = "default_stride")]
    pub stride: u64,

    /// Sleep between chunks, in milliseconds, to yield database load.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Cutover strategy. `None` auto-detects from the server version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic_switch: Option<bool>,

    /// Sleep between cutover retries, in milliseconds.
    #[serde(default = "default_retry_sleep_time_ms")]
    pub retry_sleep_time_ms: u64,

    /// Maximum cutover attempts while blocked on lock contention.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Explicit archive table name. `None` derives a timestamped name
    /// from the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,

    /// Suffix appended to the origin name to form the shadow name.
    #[serde(default = "default_temporary_table_suffix")]
    pub temporary_table_suffix: String,

    /// When false, the migration callback runs directly against the
    /// origin table and no copy swap takes place. For changes that are
    /// already safe in place.
    #[serde(default = "default_true")]
    pub entangler: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stride: default_stride(),
            throttle_ms: default_throttle_ms(),
            atomic_switch: None,
            retry_sleep_time_ms: default_retry_sleep_time_ms(),
            max_retries: default_max_retries(),
            archive_name: None,
            temporary_table_suffix: default_temporary_table_suffix(),
            entangler: default_true(),
        }
    }
}

impl Options {
    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(LhmError::Config("stride must be at least 1".into()));
        }
        if self.stride > i64::MAX as u64 {
            return Err(LhmError::Config("stride exceeds the primary key range".into()));
        }
        if self.max_retries == 0 {
            return Err(LhmError::Config("max_retries must be at least 1".into()));
        }
        if self.temporary_table_suffix.is_empty() {
            return Err(LhmError::Config(
                "temporary_table_suffix must not be empty".into(),
            ));
        }
        identifier::validate(&self.temporary_table_suffix)?;
        if let Some(archive) = &self.archive_name {
            identifier::validate(archive)?;
        }
        Ok(())
    }

    /// Inter-chunk sleep as a `Duration`.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Cutover retry sleep as a `Duration`.
    pub fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep_time_ms)
    }
}
