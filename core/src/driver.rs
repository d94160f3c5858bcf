//! The backend seam used by the migration [`Manager`](crate::Manager).

use crate::context::Context;
use crate::error::{BoxError, Error, Result};

/// A schema-migration backend bound to a single live connection.
///
/// Implementations are not expected to synchronize internally; every method
/// takes `&mut self`.
pub trait Driver {
    /// The migration body type this backend can run inside a transaction.
    type Migration;

    /// Returns the schema version the database has been migrated to.
    ///
    /// A database without a version table reports the empty string.
    fn version(&mut self, ctx: &Context) -> Result<String>;

    /// Runs `body` and rewrites the stored version from `replaced` to
    /// `version` in one transaction. Nothing is kept if any step fails.
    fn transact(
        &mut self,
        ctx: &Context,
        body: &Self::Migration,
        version: &str,
        replaced: &str,
    ) -> Result<()>;
}

/// Outcome of reading the version table, before it is folded into a [`Result`].
#[derive(Debug)]
pub enum LoadedVersion {
    /// The version table does not exist yet.
    NotInitialized,
    /// The stored version.
    Loaded(String),
    /// Any failure other than a missing table.
    ReadFailed(BoxError),
}

impl LoadedVersion {
    /// Maps `NotInitialized` to `""` and `ReadFailed` to [`Error::VersionLoad`].
    pub fn into_result(self) -> Result<String> {
        match self {
            LoadedVersion::NotInitialized => Ok(String::new()),
            LoadedVersion::Loaded(version) => Ok(version),
            LoadedVersion::ReadFailed(cause) => Err(Error::VersionLoad(cause)),
        }
    }
}
