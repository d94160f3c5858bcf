//! The `schema_version` table contract.
//!
//! The table holds exactly one row with the version of the last applied
//! migration. It is created by the root migration, which inserts the empty
//! string so the root step's conditional update has a row to match.
//!
//! ```text
//! CREATE TABLE schema_version (version_num TEXT NOT NULL);
//! ```

use revstore_core::{BoxError, Error, LoadedVersion, Result};
use rusqlite::{Connection, Transaction, params};

/// Name of the version table.
pub const SCHEMA_VERSION_TABLE: &str = "schema_version";

const QUERY_LOAD_VERSION: &str = "SELECT version_num FROM schema_version";
const QUERY_WRITE_VERSION: &str = "UPDATE schema_version SET version_num = ?1 WHERE version_num = ?2";
const CREATE_VERSION_TABLE: &str = "
CREATE TABLE schema_version (
    version_num TEXT NOT NULL
);
INSERT INTO schema_version (version_num) VALUES ('');
";

/// Creates the version table holding the empty version.
///
/// Call this from the root migration body; the runner then moves the row
/// from `''` to the root version in the same transaction.
///
/// # Errors
///
/// Fails if the table already exists.
pub fn create_version_table(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(CREATE_VERSION_TABLE)
}

/// Reads the version row, separating a missing table from other failures.
pub(crate) fn load_version(conn: &Connection) -> LoadedVersion {
    match conn.query_row(QUERY_LOAD_VERSION, [], |row| row.get::<_, String>(0)) {
        Ok(version) => LoadedVersion::Loaded(version),
        Err(err) if is_missing_table(&err) => LoadedVersion::NotInitialized,
        Err(err) => LoadedVersion::ReadFailed(BoxError::from(err)),
    }
}

/// Moves the version row from `replaced` to `version`.
///
/// Exactly one row must change. Zero rows means the stored version is not
/// `replaced`; more than one means the table itself is corrupt.
pub(crate) fn write_version(tx: &Transaction<'_>, version: &str, replaced: &str) -> Result<()> {
    let affected = tx
        .execute(QUERY_WRITE_VERSION, params![version, replaced])
        .map_err(|e| Error::VersionWrite(Box::new(e)))?;

    match affected {
        1 => Ok(()),
        0 => Err(Error::VersionMismatch {
            version: version.to_string(),
            replaced: replaced.to_string(),
            stored: load_version(tx).into_result().ok(),
        }),
        affected => Err(Error::VersionRowCount { affected }),
    }
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.starts_with("no such table")
    )
}
