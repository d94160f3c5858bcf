//! Error types for configuration, driver, and migration operations.
//!
//! Backend failures are carried as boxed sources so this crate never names a
//! concrete SQL library. Every variant keeps the operands needed to diagnose
//! the failure without re-reading state.

use std::time::Duration;

use thiserror::Error;

use crate::duration::HumanDuration;

/// Boxed error used for backend causes and migration body failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while configuring a datastore or migrating its schema.
#[derive(Debug, Error)]
pub enum Error {
    /// Revision quantization is not strictly smaller than the GC window.
    #[error(
        "revision quantization ({}) must be less than GC window ({})",
        HumanDuration::from(.quantization),
        HumanDuration::from(.gc_window)
    )]
    QuantizationTooLarge {
        quantization: Duration,
        gc_window: Duration,
    },

    /// A duration string could not be parsed.
    #[error("invalid duration '{0}': expected a number followed by ns, us, ms, s, m or h")]
    InvalidDuration(String),

    /// The configuration file could not be read or parsed.
    #[error("config file error: {0}")]
    ConfigFile(String),

    /// Connection string parse failure or initial connection failure.
    #[error("unable to instantiate driver: {0}")]
    DriverInit(#[source] BoxError),

    /// The version table exists but could not be read.
    #[error("unable to load schema version: {0}")]
    VersionLoad(#[source] BoxError),

    /// The stored version did not match the version the step replaces.
    #[error(
        "version mismatch applying '{version}': expected stored version '{replaced}', found {}",
        describe_stored(.stored)
    )]
    VersionMismatch {
        version: String,
        replaced: String,
        stored: Option<String>,
    },

    /// The version update touched more than one row.
    #[error("writing version update affected {affected} rows, should be 1")]
    VersionRowCount { affected: usize },

    /// The version update statement itself failed.
    #[error("unable to update version row: {0}")]
    VersionWrite(#[source] BoxError),

    /// A migration body returned an error.
    #[error("{0}")]
    MigrationBody(#[source] BoxError),

    /// The migration transaction could not be opened.
    #[error("unable to begin migration transaction: {0}")]
    Begin(#[source] BoxError),

    /// The migration transaction could not be committed.
    #[error("unable to commit migration transaction: {0}")]
    Commit(#[source] BoxError),

    /// The operation's context was cancelled or its deadline passed.
    #[error("operation cancelled: {0}")]
    Cancelled(crate::context::CancelReason),

    /// A migration version does not conform to the identifier grammar.
    #[error(
        "invalid migration identifier '{0}': must start with a letter and contain only letters, digits, '_' or '-'"
    )]
    InvalidIdentifier(String),

    /// `head` is reserved as an alias for the latest migration.
    #[error("cannot register a migration named '{0}': the name is reserved")]
    ReservedVersion(String),

    /// A migration with this version is already registered.
    #[error("migration '{0}' is already registered")]
    DuplicateVersion(String),

    /// Two migrations replace the same predecessor.
    #[error("migration '{version}' replaces '{replaces}', which is already replaced by '{existing}'")]
    BranchingMigration {
        version: String,
        replaces: String,
        existing: String,
    },

    /// More than one registered migration is not replaced by any other.
    #[error("cannot determine head migration: candidates are {}", .0.join(", "))]
    AmbiguousHead(Vec<String>),

    /// Every registered migration is replaced by another, so the catalog
    /// has no head.
    #[error("cannot determine head migration: every registered migration is replaced by another")]
    CyclicMigrations,

    /// No migrations are registered.
    #[error("no migrations registered")]
    NoMigrations,

    /// The requested version is not registered.
    #[error("unknown migration version '{0}'")]
    UnknownVersion(String),

    /// The stored version is not an ancestor of the target.
    #[error("no migration path from '{from}' to '{to}'")]
    UnreachableVersion { from: String, to: String },
}

impl Error {
    /// Returns `true` for an optimistic-concurrency failure during `transact`.
    ///
    /// Callers that race other migrators can re-read the version before
    /// deciding what to do next.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Error::VersionMismatch { .. })
    }
}

fn describe_stored(stored: &Option<String>) -> String {
    match stored {
        Some(version) => format!("'{version}'"),
        None => "unknown".to_string(),
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
