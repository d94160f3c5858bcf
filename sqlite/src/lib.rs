//! SQLite backend for revstore schema migrations.
//!
//! This crate implements [`revstore_core::Driver`] over a single `rusqlite`
//! connection. It provides connection-string parsing, the version-table
//! contract, and the transaction runner that applies one migration step
//! atomically.
//!
//! # Architecture
//!
//! - **`connection`**: connection-string parsing into open flags and
//!   connection settings
//! - **`schema`**: the `schema_version` table: bootstrap, read, and
//!   conditional rewrite
//! - **`driver`**: [`SqliteDriver`] lifecycle and the migration transaction
//!
//! # Quick start
//!
//! ```
//! use revstore_core::{Context, RunMode, HEAD};
//! use revstore_sqlite::{SqliteDriver, SqliteManager, create_version_table, migration};
//!
//! let mut manager = SqliteManager::new();
//! manager
//!     .register("initial", "", migration(|_ctx, tx| Ok(create_version_table(tx)?)))
//!     .unwrap();
//! manager
//!     .register(
//!         "add-relation-tuples",
//!         "initial",
//!         migration(|_ctx, tx| {
//!             tx.execute_batch("CREATE TABLE relation_tuple (id INTEGER PRIMARY KEY);")?;
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//!
//! let mut driver = SqliteDriver::open("sqlite::memory:").unwrap();
//! let report = manager
//!     .run(&mut driver, &Context::background(), HEAD, RunMode::Live)
//!     .unwrap();
//! assert_eq!(report.applied, vec!["initial", "add-relation-tuples"]);
//! ```

mod connection;
mod driver;
mod schema;

pub use connection::{ConnectionConfig, ConnectionStringError, OpenMode};
pub use driver::{SqliteDriver, SqliteManager, SqliteMigration, migration};
pub use schema::{SCHEMA_VERSION_TABLE, create_version_table};
