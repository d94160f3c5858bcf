//! Datastore configuration assembled from ordered options.
//!
//! A [`Configuration`] starts from defaults and applies each
//! [`ConfigOption`] in order, so a later option for the same field
//! overwrites an earlier one. The only cross-field rule is checked once all
//! options are applied: revision quantization must be strictly smaller than
//! the GC window.
//!
//! # Example YAML
//!
//! ```yaml
//! revision_quantization: 5s
//! gc_window: 24h
//! watch_buffer_length: 256
//! max_open_conns: 20
//! conn_max_idle_time: 5m
//! ```

use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_opt;
use crate::error::{Error, Result};

/// Default revision quantization bucket.
pub const DEFAULT_REVISION_QUANTIZATION: Duration = Duration::from_secs(5);
/// Default GC window.
pub const DEFAULT_GC_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Default capacity of the watch change buffer.
pub const DEFAULT_WATCH_BUFFER_LENGTH: u16 = 128;

/// A single field assignment applied by [`Configuration::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    /// Idle duration after which the health check closes a connection.
    /// Default: no maximum.
    ConnMaxIdleTime(Duration),
    /// Age after which a connection is closed. Default: no maximum.
    ConnMaxLifetime(Duration),
    /// Minimum pool size the health check tops up to. Default: unset.
    MinOpenConns(i32),
    /// Maximum pool size. Default: no maximum.
    MaxOpenConns(i32),
    /// Entries buffered for a watch client before it reads them. Default: 128.
    WatchBufferLength(u16),
    /// Bucket size advertised revisions are rounded to. Default: 5s.
    RevisionQuantization(Duration),
    /// Maximum age of a revision still considered valid. Default: 24h.
    GcWindow(Duration),
}

impl ConfigOption {
    fn apply(self, config: &mut Configuration) {
        match self {
            ConfigOption::ConnMaxIdleTime(idle) => config.conn_max_idle_time = Some(idle),
            ConfigOption::ConnMaxLifetime(lifetime) => config.conn_max_lifetime = Some(lifetime),
            ConfigOption::MinOpenConns(conns) => config.min_open_conns = Some(conns),
            ConfigOption::MaxOpenConns(conns) => config.max_open_conns = Some(conns),
            ConfigOption::WatchBufferLength(len) => config.watch_buffer_length = len,
            ConfigOption::RevisionQuantization(bucket) => config.revision_quantization = bucket,
            ConfigOption::GcWindow(window) => config.gc_window = window,
        }
    }
}

/// Validated, immutable datastore parameters.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use revstore_core::{ConfigOption, Configuration};
///
/// let config = Configuration::build([
///     ConfigOption::GcWindow(Duration::from_secs(3600)),
///     ConfigOption::MaxOpenConns(10),
/// ])
/// .unwrap();
/// assert_eq!(config.gc_window(), Duration::from_secs(3600));
/// assert_eq!(config.max_open_conns(), Some(10));
///
/// // Quantization (default 5s) must stay below the GC window.
/// assert!(Configuration::build([ConfigOption::GcWindow(Duration::from_secs(1))]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    #[serde(with = "serde_opt")]
    conn_max_idle_time: Option<Duration>,
    #[serde(with = "serde_opt")]
    conn_max_lifetime: Option<Duration>,
    min_open_conns: Option<i32>,
    max_open_conns: Option<i32>,
    watch_buffer_length: u16,
    #[serde(serialize_with = "serialize_duration")]
    revision_quantization: Duration,
    #[serde(serialize_with = "serialize_duration")]
    gc_window: Duration,
}

fn serialize_duration<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&crate::HumanDuration(*value))
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            conn_max_idle_time: None,
            conn_max_lifetime: None,
            min_open_conns: None,
            max_open_conns: None,
            watch_buffer_length: DEFAULT_WATCH_BUFFER_LENGTH,
            revision_quantization: DEFAULT_REVISION_QUANTIZATION,
            gc_window: DEFAULT_GC_WINDOW,
        }
    }
}

impl Configuration {
    /// Returns a new [`ConfigurationBuilder`].
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Applies `options` in order on top of the defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuantizationTooLarge`] with both values when the
    /// final revision quantization is not strictly less than the GC window.
    pub fn build(options: impl IntoIterator<Item = ConfigOption>) -> Result<Self> {
        let mut computed = Self::default();
        for option in options {
            option.apply(&mut computed);
        }

        if computed.revision_quantization >= computed.gc_window {
            return Err(Error::QuantizationTooLarge {
                quantization: computed.revision_quantization,
                gc_window: computed.gc_window,
            });
        }

        Ok(computed)
    }

    pub fn conn_max_idle_time(&self) -> Option<Duration> {
        self.conn_max_idle_time
    }

    pub fn conn_max_lifetime(&self) -> Option<Duration> {
        self.conn_max_lifetime
    }

    pub fn min_open_conns(&self) -> Option<i32> {
        self.min_open_conns
    }

    pub fn max_open_conns(&self) -> Option<i32> {
        self.max_open_conns
    }

    pub fn watch_buffer_length(&self) -> u16 {
        self.watch_buffer_length
    }

    pub fn revision_quantization(&self) -> Duration {
        self.revision_quantization
    }

    pub fn gc_window(&self) -> Duration {
        self.gc_window
    }
}

/// Fluent front end over [`Configuration::build`].
///
/// Each method records one option; nothing is validated until
/// [`build`](Self::build).
///
/// ```
/// use std::time::Duration;
/// use revstore_core::Configuration;
///
/// let config = Configuration::builder()
///     .revision_quantization(Duration::from_secs(1))
///     .gc_window(Duration::from_secs(600))
///     .watch_buffer_length(512)
///     .build()
///     .unwrap();
/// assert_eq!(config.watch_buffer_length(), 512);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigurationBuilder {
    options: Vec<ConfigOption>,
}

impl ConfigurationBuilder {
    pub fn conn_max_idle_time(self, idle: Duration) -> Self {
        self.option(ConfigOption::ConnMaxIdleTime(idle))
    }

    pub fn conn_max_lifetime(self, lifetime: Duration) -> Self {
        self.option(ConfigOption::ConnMaxLifetime(lifetime))
    }

    pub fn min_open_conns(self, conns: i32) -> Self {
        self.option(ConfigOption::MinOpenConns(conns))
    }

    pub fn max_open_conns(self, conns: i32) -> Self {
        self.option(ConfigOption::MaxOpenConns(conns))
    }

    pub fn watch_buffer_length(self, len: u16) -> Self {
        self.option(ConfigOption::WatchBufferLength(len))
    }

    pub fn revision_quantization(self, bucket: Duration) -> Self {
        self.option(ConfigOption::RevisionQuantization(bucket))
    }

    pub fn gc_window(self, window: Duration) -> Self {
        self.option(ConfigOption::GcWindow(window))
    }

    /// Appends an arbitrary option.
    pub fn option(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    /// Appends several options, preserving their order.
    pub fn options(mut self, options: impl IntoIterator<Item = ConfigOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<Configuration> {
        Configuration::build(self.options)
    }
}

/// YAML form of the datastore parameters. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, with = "serde_opt", skip_serializing_if = "Option::is_none")]
    pub conn_max_idle_time: Option<Duration>,
    #[serde(default, with = "serde_opt", skip_serializing_if = "Option::is_none")]
    pub conn_max_lifetime: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_open_conns: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_open_conns: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_buffer_length: Option<u16>,
    #[serde(default, with = "serde_opt", skip_serializing_if = "Option::is_none")]
    pub revision_quantization: Option<Duration>,
    #[serde(default, with = "serde_opt", skip_serializing_if = "Option::is_none")]
    pub gc_window: Option<Duration>,
}

impl ConfigFile {
    /// Loads a config file from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] if the file cannot be opened or does not
    /// parse, including unknown keys and malformed durations.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::ConfigFile(format!("failed to open '{}': {e}", path.display())))?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|e| Error::ConfigFile(format!("failed to parse '{}': {e}", path.display())))
    }

    /// Parses a config file from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::ConfigFile(e.to_string()))
    }

    /// Options for the keys present in the file, in field declaration order.
    pub fn options(&self) -> Vec<ConfigOption> {
        let mut options = Vec::new();
        if let Some(idle) = self.conn_max_idle_time {
            options.push(ConfigOption::ConnMaxIdleTime(idle));
        }
        if let Some(lifetime) = self.conn_max_lifetime {
            options.push(ConfigOption::ConnMaxLifetime(lifetime));
        }
        if let Some(conns) = self.min_open_conns {
            options.push(ConfigOption::MinOpenConns(conns));
        }
        if let Some(conns) = self.max_open_conns {
            options.push(ConfigOption::MaxOpenConns(conns));
        }
        if let Some(len) = self.watch_buffer_length {
            options.push(ConfigOption::WatchBufferLength(len));
        }
        if let Some(bucket) = self.revision_quantization {
            options.push(ConfigOption::RevisionQuantization(bucket));
        }
        if let Some(window) = self.gc_window {
            options.push(ConfigOption::GcWindow(window));
        }
        options
    }

    /// Builds a validated [`Configuration`] from this file alone.
    pub fn build(&self) -> Result<Configuration> {
        Configuration::build(self.options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::build([]).unwrap();
        assert_eq!(config.gc_window(), Duration::from_secs(86_400));
        assert_eq!(config.revision_quantization(), Duration::from_secs(5));
        assert_eq!(config.watch_buffer_length(), 128);
        assert_eq!(config.min_open_conns(), None);
        assert_eq!(config.max_open_conns(), None);
        assert_eq!(config.conn_max_idle_time(), None);
        assert_eq!(config.conn_max_lifetime(), None);
    }

    #[test]
    fn test_gc_window_below_default_quantization_fails() {
        let err = Configuration::build([ConfigOption::GcWindow(Duration::from_secs(1))]).unwrap_err();
        match err {
            Error::QuantizationTooLarge {
                quantization,
                gc_window,
            } => {
                assert_eq!(quantization, Duration::from_secs(5));
                assert_eq!(gc_window, Duration::from_secs(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_message_names_both_values() {
        let err = Configuration::build([ConfigOption::GcWindow(Duration::from_secs(1))]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "revision quantization (5s) must be less than GC window (1s)"
        );
    }

    #[test]
    fn test_equal_values_are_rejected() {
        let result = Configuration::build([
            ConfigOption::RevisionQuantization(Duration::from_secs(60)),
            ConfigOption::GcWindow(Duration::from_secs(60)),
        ]);
        assert!(matches!(result, Err(Error::QuantizationTooLarge { .. })));
    }

    #[test]
    fn test_last_write_wins() {
        let config = Configuration::build([
            ConfigOption::MaxOpenConns(5),
            ConfigOption::WatchBufferLength(10),
            ConfigOption::MaxOpenConns(50),
        ])
        .unwrap();
        assert_eq!(config.max_open_conns(), Some(50));
        assert_eq!(config.watch_buffer_length(), 10);
    }

    #[test]
    fn test_validation_sees_only_final_values() {
        // Invalid midway, valid at the end.
        let config = Configuration::build([
            ConfigOption::GcWindow(Duration::from_secs(1)),
            ConfigOption::RevisionQuantization(Duration::ZERO),
        ])
        .unwrap();
        assert_eq!(config.revision_quantization(), Duration::ZERO);
    }

    #[test]
    fn test_zero_values_accepted() {
        let config = Configuration::builder()
            .min_open_conns(0)
            .max_open_conns(0)
            .watch_buffer_length(0)
            .conn_max_idle_time(Duration::ZERO)
            .conn_max_lifetime(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(config.min_open_conns(), Some(0));
        assert_eq!(config.watch_buffer_length(), 0);
        assert_eq!(config.conn_max_lifetime(), Some(Duration::ZERO));
    }

    #[test]
    fn test_config_file_parses_durations() {
        let file = ConfigFile::from_yaml(
            "revision_quantization: 250ms\ngc_window: 1h30m\nmax_open_conns: 8\n",
        )
        .unwrap();
        let config = file.build().unwrap();
        assert_eq!(config.revision_quantization(), Duration::from_millis(250));
        assert_eq!(config.gc_window(), Duration::from_secs(5_400));
        assert_eq!(config.max_open_conns(), Some(8));
        assert_eq!(config.watch_buffer_length(), DEFAULT_WATCH_BUFFER_LENGTH);
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        let result = ConfigFile::from_yaml("gc_windw: 1h\n");
        assert!(matches!(result, Err(Error::ConfigFile(_))));
    }

    #[test]
    fn test_config_file_rejects_bad_duration() {
        let result = ConfigFile::from_yaml("gc_window: forever\n");
        assert!(matches!(result, Err(Error::ConfigFile(_))));
    }

    #[test]
    fn test_config_file_options_then_overrides() {
        let file = ConfigFile::from_yaml("gc_window: 2s\n").unwrap();
        let config = Configuration::builder()
            .options(file.options())
            .gc_window(Duration::from_secs(10))
            .build()
            .unwrap();
        assert_eq!(config.gc_window(), Duration::from_secs(10));
    }
}
