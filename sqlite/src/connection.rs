//! Connection-string handling for the SQLite driver.
//!
//! Accepted forms:
//!
//! - `sqlite::memory:` or `:memory:`: a private in-memory database
//! - `file:<path>[?<params>]`: an SQLite URI, handed to SQLite unchanged
//! - `sqlite://<path>`, `sqlite:<path>` or a bare path, rewritten to a
//!   `file:` URI that keeps the query string
//!
//! URI parameters (`mode`, `cache`, `immutable`, `vfs`, ...) are interpreted
//! by SQLite itself. The only parameter handled here is
//! `busy_timeout=<duration>`, which SQLite has no URI form for; it is
//! removed from the URI and applied to the connection after it opens.
//!
//! ```
//! use revstore_sqlite::ConnectionConfig;
//!
//! let config = ConnectionConfig::parse("sqlite:///var/lib/revstore.db?mode=rw&busy_timeout=5s").unwrap();
//! assert_eq!(config.uri(), Some("file:/var/lib/revstore.db?mode=rw"));
//! assert!(ConnectionConfig::parse("postgres://localhost/db").is_err());
//! ```

use std::time::Duration;

use rusqlite::OpenFlags;
use thiserror::Error;

const BUSY_TIMEOUT_PARAM: &str = "busy_timeout";

/// Reasons a connection string is rejected before SQLite sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("unsupported connection scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("connection string has no database path")]
    MissingPath,

    #[error("invalid value '{value}' for connection parameter '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Access requested through the open flags.
///
/// A URI `mode` parameter can only narrow this further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    /// Read-write, creating the file if it is missing.
    #[default]
    ReadWriteCreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Memory,
    Uri(String),
}

/// Parsed connection parameters for [`SqliteDriver::open`](crate::SqliteDriver::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    target: Target,
    mode: OpenMode,
    busy_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Parses a connection string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionStringError`] for an empty string, a foreign
    /// scheme, a missing path or a malformed `busy_timeout`. Anything else
    /// is left for SQLite to reject when the connection opens.
    pub fn parse(url: &str) -> Result<Self, ConnectionStringError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let (base, query) = match url.split_once('?') {
            Some((base, query)) => (base, query),
            None => (url, ""),
        };
        let (query, busy_timeout) = take_busy_timeout(query)?;

        let target = if base == "sqlite::memory:" || base == ":memory:" {
            Target::Memory
        } else if base.starts_with("file:") {
            Target::Uri(with_query(base.to_string(), &query))
        } else {
            let path = strip_scheme(base)?;
            if path.is_empty() {
                return Err(ConnectionStringError::MissingPath);
            }
            Target::Uri(with_query(format!("file:{}", escape_path(path)), &query))
        };

        Ok(Self {
            target,
            mode: OpenMode::default(),
            busy_timeout,
        })
    }

    /// Replaces the access requested through the open flags.
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.target == Target::Memory
    }

    /// The `file:` URI handed to SQLite, or `None` for `sqlite::memory:`.
    pub fn uri(&self) -> Option<&str> {
        match &self.target {
            Target::Memory => None,
            Target::Uri(uri) => Some(uri),
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout
    }

    pub(crate) fn open_flags(&self) -> OpenFlags {
        let access = match self.mode {
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadWriteCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };
        access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

/// Splits `busy_timeout` out of a query string, returning the rest untouched.
fn take_busy_timeout(query: &str) -> Result<(String, Option<Duration>), ConnectionStringError> {
    let mut busy_timeout = None;
    let mut rest = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((BUSY_TIMEOUT_PARAM, value)) => {
                let timeout = revstore_core::parse_duration(value).map_err(|_| {
                    ConnectionStringError::InvalidValue {
                        key: BUSY_TIMEOUT_PARAM.to_string(),
                        value: value.to_string(),
                    }
                })?;
                busy_timeout = Some(timeout);
            }
            _ => rest.push(pair),
        }
    }
    Ok((rest.join("&"), busy_timeout))
}

fn strip_scheme(base: &str) -> Result<&str, ConnectionStringError> {
    if let Some(rest) = base.strip_prefix("sqlite://") {
        Ok(rest)
    } else if let Some(rest) = base.strip_prefix("sqlite:") {
        Ok(rest)
    } else if let Some((scheme, _)) = base.split_once("://") {
        Err(ConnectionStringError::UnsupportedScheme(scheme.to_string()))
    } else {
        Ok(base)
    }
}

/// Escapes the characters SQLite's URI parser treats specially in a path.
fn escape_path(path: &str) -> String {
    path.replace('%', "%25").replace('#', "%23")
}

fn with_query(mut uri: String, query: &str) -> String {
    if !query.is_empty() {
        uri.push('?');
        uri.push_str(query);
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_forms() {
        assert!(ConnectionConfig::parse("sqlite::memory:").unwrap().is_memory());
        assert!(ConnectionConfig::parse(":memory:").unwrap().is_memory());
        assert_eq!(ConnectionConfig::parse(":memory:").unwrap().uri(), None);
    }

    #[test]
    fn test_path_forms_become_file_uris() {
        for url in ["sqlite:///tmp/rs.db", "sqlite:/tmp/rs.db", "/tmp/rs.db"] {
            let config = ConnectionConfig::parse(url).unwrap();
            assert_eq!(config.uri(), Some("file:/tmp/rs.db"), "{url}");
            assert_eq!(config.mode(), OpenMode::ReadWriteCreate);
        }
        let relative = ConnectionConfig::parse("sqlite://data/rs.db?mode=ro").unwrap();
        assert_eq!(relative.uri(), Some("file:data/rs.db?mode=ro"));
    }

    #[test]
    fn test_file_uri_is_passed_through() {
        let uri = "file:///tmp/rs.db?mode=ro&cache=shared";
        assert_eq!(ConnectionConfig::parse(uri).unwrap().uri(), Some(uri));

        let config = ConnectionConfig::parse("file:rs.db?mode=memory&busy_timeout=5s").unwrap();
        assert_eq!(config.uri(), Some("file:rs.db?mode=memory"));
        assert_eq!(config.busy_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_busy_timeout_is_removed_from_uri() {
        let config = ConnectionConfig::parse("sqlite://rs.db?busy_timeout=250ms").unwrap();
        assert_eq!(config.uri(), Some("file:rs.db"));
        assert_eq!(config.busy_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_special_path_characters_are_escaped() {
        let config = ConnectionConfig::parse("sqlite://data/100%#1.db").unwrap();
        assert_eq!(config.uri(), Some("file:data/100%25%231.db"));
    }

    #[test]
    fn test_read_only_flags() {
        let config = ConnectionConfig::parse("rs.db").unwrap().with_mode(OpenMode::ReadOnly);
        let flags = config.open_flags();
        assert!(flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY));
        assert!(!flags.contains(OpenFlags::SQLITE_OPEN_CREATE));
        assert!(flags.contains(OpenFlags::SQLITE_OPEN_URI));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(ConnectionConfig::parse("  "), Err(ConnectionStringError::Empty));
        assert_eq!(
            ConnectionConfig::parse("postgres://localhost:5432/db"),
            Err(ConnectionStringError::UnsupportedScheme("postgres".into()))
        );
        assert_eq!(ConnectionConfig::parse("sqlite://"), Err(ConnectionStringError::MissingPath));
        assert!(matches!(
            ConnectionConfig::parse("rs.db?busy_timeout=soon"),
            Err(ConnectionStringError::InvalidValue { .. })
        ));
    }
}
