//! Integration tests for the revstore-core crate.

use std::io::Write;
use std::time::Duration;

use proptest::prelude::*;
use revstore_core::{
    ConfigFile, ConfigOption, Configuration, DEFAULT_GC_WINDOW, DEFAULT_REVISION_QUANTIZATION,
    DEFAULT_WATCH_BUFFER_LENGTH, Error,
};

fn duration_strategy() -> impl Strategy<Value = Duration> {
    prop_oneof![
        (0u64..10).prop_map(Duration::from_secs),
        (0u64..200_000).prop_map(Duration::from_millis),
        (0u64..48).prop_map(|h| Duration::from_secs(h * 3_600)),
    ]
}

fn option_strategy() -> impl Strategy<Value = ConfigOption> {
    prop_oneof![
        duration_strategy().prop_map(ConfigOption::ConnMaxIdleTime),
        duration_strategy().prop_map(ConfigOption::ConnMaxLifetime),
        any::<i32>().prop_map(ConfigOption::MinOpenConns),
        any::<i32>().prop_map(ConfigOption::MaxOpenConns),
        any::<u16>().prop_map(ConfigOption::WatchBufferLength),
        duration_strategy().prop_map(ConfigOption::RevisionQuantization),
        duration_strategy().prop_map(ConfigOption::GcWindow),
    ]
}

/// Folds options the slow way, one field at a time, for comparison.
#[derive(Default)]
struct Expected {
    idle: Option<Duration>,
    lifetime: Option<Duration>,
    min: Option<i32>,
    max: Option<i32>,
    watch: Option<u16>,
    quantization: Option<Duration>,
    gc: Option<Duration>,
}

impl Expected {
    fn from_options(options: &[ConfigOption]) -> Self {
        let mut expected = Self::default();
        for option in options {
            match *option {
                ConfigOption::ConnMaxIdleTime(d) => expected.idle = Some(d),
                ConfigOption::ConnMaxLifetime(d) => expected.lifetime = Some(d),
                ConfigOption::MinOpenConns(n) => expected.min = Some(n),
                ConfigOption::MaxOpenConns(n) => expected.max = Some(n),
                ConfigOption::WatchBufferLength(n) => expected.watch = Some(n),
                ConfigOption::RevisionQuantization(d) => expected.quantization = Some(d),
                ConfigOption::GcWindow(d) => expected.gc = Some(d),
            }
        }
        expected
    }
}

proptest! {
    #[test]
    fn test_build_matches_last_written_values(options in prop::collection::vec(option_strategy(), 0..12)) {
        let expected = Expected::from_options(&options);
        let quantization = expected.quantization.unwrap_or(DEFAULT_REVISION_QUANTIZATION);
        let gc = expected.gc.unwrap_or(DEFAULT_GC_WINDOW);

        match Configuration::build(options.clone()) {
            Ok(config) => {
                prop_assert!(quantization < gc);
                prop_assert_eq!(config.conn_max_idle_time(), expected.idle);
                prop_assert_eq!(config.conn_max_lifetime(), expected.lifetime);
                prop_assert_eq!(config.min_open_conns(), expected.min);
                prop_assert_eq!(config.max_open_conns(), expected.max);
                prop_assert_eq!(
                    config.watch_buffer_length(),
                    expected.watch.unwrap_or(DEFAULT_WATCH_BUFFER_LENGTH)
                );
                prop_assert_eq!(config.revision_quantization(), quantization);
                prop_assert_eq!(config.gc_window(), gc);
            }
            Err(Error::QuantizationTooLarge { quantization: q, gc_window: g }) => {
                prop_assert!(quantization >= gc);
                prop_assert_eq!(q, quantization);
                prop_assert_eq!(g, gc);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn test_builder_and_option_list_agree(options in prop::collection::vec(option_strategy(), 0..12)) {
        let direct = Configuration::build(options.clone()).ok();
        let fluent = Configuration::builder().options(options).build().ok();
        prop_assert_eq!(direct, fluent);
    }
}

#[test]
fn test_config_file_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "revision_quantization: 2s\ngc_window: 10m\nwatch_buffer_length: 64\nconn_max_lifetime: 30m"
    )
    .unwrap();

    let loaded = ConfigFile::load(file.path()).unwrap();
    let config = loaded.build().unwrap();
    assert_eq!(config.revision_quantization(), Duration::from_secs(2));
    assert_eq!(config.gc_window(), Duration::from_secs(600));
    assert_eq!(config.watch_buffer_length(), 64);
    assert_eq!(config.conn_max_lifetime(), Some(Duration::from_secs(1_800)));
    assert_eq!(config.max_open_conns(), None);
}

#[test]
fn test_config_file_invalid_combination_fails_at_build() {
    let file = ConfigFile::from_yaml("revision_quantization: 1h\ngc_window: 30m\n").unwrap();
    let err = file.build().unwrap_err();
    assert_eq!(
        err.to_string(),
        "revision quantization (1h) must be less than GC window (30m)"
    );
}

#[test]
fn test_config_file_missing_path_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigFile::load(dir.path().join("missing.yaml"));
    assert!(matches!(result, Err(Error::ConfigFile(_))));
}

#[test]
fn test_configuration_serializes_durations_compactly() {
    let config = Configuration::build([ConfigOption::MaxOpenConns(4)]).unwrap();
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("revision_quantization: 5s"), "{yaml}");
    assert!(yaml.contains("gc_window: 24h"), "{yaml}");
    assert!(yaml.contains("max_open_conns: 4"), "{yaml}");
}
