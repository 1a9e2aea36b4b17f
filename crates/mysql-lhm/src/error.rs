//! Error types for the schema change engine.

use thiserror::Error;

/// MySQL `ER_LOCK_WAIT_TIMEOUT`: a row or metadata lock could not be
/// acquired within the session timeout.
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;

/// MySQL `ER_LOCK_DEADLOCK`: the statement was chosen as a deadlock victim.
pub const ER_LOCK_DEADLOCK: u16 = 1213;

/// Run phase a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Creating the shadow table from the origin's definition.
    ShadowCreate,
    /// Running the caller's migration callback.
    MigrateCallback,
    /// Adjusting session lock-wait timeouts.
    Session,
    /// Installing or removing the mirror triggers.
    Entangle,
    /// Back-filling pre-existing rows.
    Chunk,
    /// The cutover rename.
    Switch,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::ShadowCreate => "shadow-create",
            Phase::MigrateCallback => "migration callback",
            Phase::Session => "session setup",
            Phase::Entangle => "entangle",
            Phase::Chunk => "chunk",
            Phase::Switch => "switch",
        };
        f.write_str(name)
    }
}

/// Main error type for schema change operations.
#[derive(Error, Debug)]
pub enum LhmError {
    /// Invalid options or identifiers supplied by the caller.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run precondition does not hold (missing integer primary key,
    /// shadow name collision, unsupported cutover strategy).
    #[error("Precondition failed for table `{table}`: {message}")]
    Precondition { table: String, message: String },

    /// Server or driver failure. `code` carries the MySQL error code when
    /// the server reported one, so callers can classify lock contention.
    #[error("Database error: {message}")]
    Db { code: Option<u16>, message: String },

    /// A failure tagged with the run phase and origin table it occurred in.
    #[error("Phase {phase} failed for table `{table}`")]
    Phase {
        phase: Phase,
        table: String,
        #[source]
        source: Box<LhmError>,
    },

    /// The cutover rename stayed blocked on lock contention through the
    /// whole retry budget.
    #[error("Cutover for table `{table}` still contended after {attempts} attempts")]
    SwitchRetriesExhausted {
        table: String,
        attempts: u32,
        #[source]
        source: Box<LhmError>,
    },
}

impl LhmError {
    /// Create a database error.
    pub fn db(message: impl Into<String>, code: Option<u16>) -> Self {
        LhmError::Db {
            code,
            message: message.into(),
        }
    }

    /// Create a precondition error for a table.
    pub fn precondition(table: impl Into<String>, message: impl Into<String>) -> Self {
        LhmError::Precondition {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Tag this error with the phase and origin table it occurred in.
    pub fn in_phase(self, phase: Phase, table: impl Into<String>) -> Self {
        LhmError::Phase {
            phase,
            table: table.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is lock contention the
    /// switcher may retry: lock-wait timeout or deadlock victim.
    pub fn is_lock_wait_timeout(&self) -> bool {
        match self {
            LhmError::Db { code: Some(code), .. } => {
                *code == ER_LOCK_WAIT_TIMEOUT || *code == ER_LOCK_DEADLOCK
            }
            LhmError::Phase { source, .. } => source.is_lock_wait_timeout(),
            _ => false,
        }
    }

    /// Format error with full details including the error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<mysql_async::Error> for LhmError {
    fn from(err: mysql_async::Error) -> Self {
        let code = match &err {
            mysql_async::Error::Server(server) => Some(server.code),
            _ => None,
        };
        LhmError::Db {
            code,
            message: err.to_string(),
        }
    }
}

/// Result type alias for schema change operations.
pub type Result<T> = std::result::Result<T, LhmError>;
