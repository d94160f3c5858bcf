//! Backend-agnostic core of the revstore migration tooling.
//!
//! This crate holds everything that does not depend on a concrete SQL
//! backend:
//!
//! - [`Configuration`]: validated datastore parameters built from ordered
//!   [`ConfigOption`]s, or loaded from YAML via [`ConfigFile`].
//! - [`Driver`]: the seam a backend implements to report its schema
//!   version and run one migration step atomically.
//! - [`Manager`]: the migration catalog, with identifier-checked registration,
//!   head lookup and ordered application through a driver.
//! - [`Context`]: cancellation and deadlines for blocking operations.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use revstore_core::{ConfigOption, Configuration, Error};
//!
//! let config = Configuration::build([
//!     ConfigOption::RevisionQuantization(Duration::from_secs(1)),
//!     ConfigOption::GcWindow(Duration::from_secs(3600)),
//! ])
//! .unwrap();
//! assert_eq!(config.watch_buffer_length(), 128);
//!
//! let err = Configuration::build([ConfigOption::GcWindow(Duration::from_secs(1))]).unwrap_err();
//! assert!(matches!(err, Error::QuantizationTooLarge { .. }));
//! ```

mod config;
mod context;
mod driver;
mod duration;
mod error;
mod manager;

pub use config::{
    ConfigFile, ConfigOption, Configuration, ConfigurationBuilder, DEFAULT_GC_WINDOW,
    DEFAULT_REVISION_QUANTIZATION, DEFAULT_WATCH_BUFFER_LENGTH,
};
pub use context::{CancelReason, Context};
pub use driver::{Driver, LoadedVersion};
pub use duration::{HumanDuration, parse_duration};
pub use error::{BoxError, Error, Result};
pub use manager::{HEAD, Manager, Migration, RunMode, RunReport, validate_identifier};
