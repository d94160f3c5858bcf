//! SQLite implementation of the revstore migration [`Driver`].
//!
//! A [`SqliteDriver`] owns one dedicated connection used only for
//! migrations. Every [`transact`](Driver::transact) call runs the migration
//! body and the version bump inside a single `BEGIN IMMEDIATE` transaction,
//! so either both are committed or neither is.
//!
//! # Example
//!
//! ```
//! use revstore_core::{Context, Driver};
//! use revstore_sqlite::{SqliteDriver, create_version_table, migration};
//!
//! let mut driver = SqliteDriver::open("sqlite::memory:").unwrap();
//! let ctx = Context::background();
//! assert_eq!(driver.version(&ctx).unwrap(), "");
//!
//! let initial = migration(|_ctx, tx| {
//!     create_version_table(tx)?;
//!     Ok(())
//! });
//! driver.transact(&ctx, &initial, "initial", "").unwrap();
//! assert_eq!(driver.version(&ctx).unwrap(), "initial");
//!
//! driver.close().unwrap();
//! ```

use revstore_core::{BoxError, Context, Driver, Error, Manager, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionConfig, OpenMode};
use crate::schema::{load_version, write_version};

/// Number of SQLite VM instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// A migration body run inside the driver's transaction.
///
/// Bodies must not commit or roll back the transaction they are given.
pub type SqliteMigration =
    Box<dyn Fn(&Context, &Transaction<'_>) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Migration catalog for the SQLite driver.
pub type SqliteManager = Manager<SqliteMigration>;

/// Boxes a closure as a [`SqliteMigration`].
pub fn migration<F>(body: F) -> SqliteMigration
where
    F: Fn(&Context, &Transaction<'_>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Box::new(body)
}

/// Schema-migration driver over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Parses `url` and opens one connection to it.
    ///
    /// Initialization is attempted once; the caller owns any retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverInit`] wrapping either the
    /// [`ConnectionStringError`](crate::ConnectionStringError) or the
    /// connection failure.
    pub fn open(url: &str) -> Result<Self> {
        let config = ConnectionConfig::parse(url).map_err(|e| Error::DriverInit(Box::new(e)))?;
        Self::open_with_config(&config)
    }

    /// Like [`open`](Self::open), but never creates or writes the database.
    pub fn open_read_only(url: &str) -> Result<Self> {
        let config = ConnectionConfig::parse(url).map_err(|e| Error::DriverInit(Box::new(e)))?;
        Self::open_with_config(&config.with_mode(OpenMode::ReadOnly))
    }

    /// Opens a connection from already-parsed parameters.
    pub fn open_with_config(config: &ConnectionConfig) -> Result<Self> {
        let init_err = |e: rusqlite::Error| Error::DriverInit(Box::new(e));
        let flags = config.open_flags();
        let mut conn = match config.uri() {
            Some(uri) => Connection::open_with_flags(uri, flags).map_err(init_err)?,
            None => Connection::open_in_memory_with_flags(flags).map_err(init_err)?,
        };
        if let Some(timeout) = config.busy_timeout() {
            conn.busy_timeout(timeout).map_err(init_err)?;
        }
        #[allow(deprecated)]
        conn.trace(Some(trace_statement));

        debug!(
            uri = config.uri().unwrap_or(":memory:"),
            mode = ?config.mode(),
            "opened migration connection"
        );
        Ok(Self { conn })
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, returning the backend's error as-is.
    pub fn close(self) -> std::result::Result<(), rusqlite::Error> {
        self.conn.close().map_err(|(_conn, err)| err)
    }

    /// Runs `f` with SQLite's progress handler interrupting statements once
    /// `ctx` is done.
    fn with_interrupt<T>(&mut self, ctx: &Context, f: impl FnOnce(&mut Connection) -> T) -> T {
        let watched = ctx.clone();
        self.conn
            .progress_handler(PROGRESS_INTERVAL, Some(move || watched.is_done()));
        let result = f(&mut self.conn);
        self.conn.progress_handler(PROGRESS_INTERVAL, None::<fn() -> bool>);
        result
    }
}

impl Driver for SqliteDriver {
    type Migration = SqliteMigration;

    fn version(&mut self, ctx: &Context) -> Result<String> {
        ctx.check()?;
        self.with_interrupt(ctx, |conn| load_version(conn).into_result())
    }

    fn transact(
        &mut self,
        ctx: &Context,
        body: &SqliteMigration,
        version: &str,
        replaced: &str,
    ) -> Result<()> {
        ctx.check()?;
        self.with_interrupt(ctx, |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::Begin(Box::new(e)))?;

            match apply(ctx, &tx, body, version, replaced) {
                Ok(()) => {
                    tx.commit().map_err(|e| Error::Commit(Box::new(e)))?;
                    debug!(version, replaced, "committed migration");
                    Ok(())
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(
                            version,
                            error = %rollback_err,
                            "rollback after failed migration did not succeed"
                        );
                    }
                    Err(err)
                }
            }
        })
    }
}

fn apply(
    ctx: &Context,
    tx: &Transaction<'_>,
    body: &SqliteMigration,
    version: &str,
    replaced: &str,
) -> Result<()> {
    body(ctx, tx).map_err(Error::MigrationBody)?;
    ctx.check()?;
    write_version(tx, version, replaced)?;
    ctx.check()
}

fn trace_statement(sql: &str) {
    trace!(target: "revstore_sqlite::sql", sql, "executing statement");
}
