//! # Configuration Tests
//!
//! Validates listen-address parsing, thread-count validation, model path
//! resolution, TOML loading and environment overrides.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use textpool_core::config::{DEFAULT_QUEUE_CAPACITY, ENV_LISTEN, ENV_MODEL_PATH, ENV_THREADS};
use textpool_core::{ConfigError, RawConfig};

mod common;

fn raw(listen: Option<&str>, threads: Option<&str>) -> RawConfig {
    RawConfig {
        listen: listen.map(str::to_string),
        threads: threads.map(str::to_string),
        model_path: Some(common::fixture_model_path()),
        queue_capacity: None,
    }
}

#[test]
fn test_listen_host_and_port() {
    let config = raw(Some("127.0.0.1:9000"), Some("2")).resolve().unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 9000);
    assert_eq!(config.threads, 2);
    assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    assert_eq!(config.listen_addr(), "127.0.0.1:9000");
}

#[test]
fn test_listen_without_port_uses_default_port() {
    let config = raw(Some("localhost"), Some("1")).resolve().unwrap();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 8441);

    let config = raw(Some("[::1]"), Some("1")).resolve().unwrap();
    assert_eq!(config.host, "[::1]");
    assert_eq!(config.listen_addr(), "[::1]:8441");
}

#[test]
fn test_bracketed_ipv6_listen_with_port() {
    let config = raw(Some("[::1]:9000"), Some("1")).resolve().unwrap();
    assert_eq!(config.host, "[::1]");
    assert_eq!(config.port, 9000);
}

#[test]
fn test_empty_listen_uses_any_address() {
    let config = raw(Some(""), Some("1")).resolve().unwrap();
    assert_eq!(config.listen_addr(), "0.0.0.0:8441");
}

#[test]
fn test_missing_listen_is_fatal() {
    let err = raw(None, Some("1")).resolve().unwrap_err();
    assert!(matches!(err, ConfigError::MissingListen), "got {err:?}");
}

#[test]
fn test_bad_listen_values_are_fatal() {
    for value in [":8080", "host:", "host:http", "host:0", "host:70000"] {
        let err = raw(Some(value), Some("1")).resolve().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidListen { .. }),
            "{value:?} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn test_thread_count_validation() {
    assert!(matches!(
        raw(Some("127.0.0.1:1"), None).resolve().unwrap_err(),
        ConfigError::MissingThreads
    ));
    assert!(matches!(
        raw(Some("127.0.0.1:1"), Some("")).resolve().unwrap_err(),
        ConfigError::MissingThreads
    ));
    for value in ["0", "-3", "four", "2.5"] {
        let err = raw(Some("127.0.0.1:1"), Some(value)).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreads(_)), "{value:?} gave {err:?}");
    }
}

#[test]
fn test_missing_model_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = raw(Some("127.0.0.1:1"), Some("2"));

    config.model_path = Some(dir.path().join("nope.toml"));
    let err = config.clone().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::ModelNotFound(_)));
    assert!(err.to_string().contains("nope.toml"), "message should name the path: {err}");

    // A directory is not a model file either.
    config.model_path = Some(dir.path().to_path_buf());
    assert!(matches!(config.resolve().unwrap_err(), ConfigError::ModelNotFound(_)));
}

#[test]
fn test_toml_file_with_numbers_and_strings() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "listen = \"127.0.0.1:8500\"\nthreads = 3\nqueue_capacity = \"0\"\nmodel_path = {:?}",
        common::fixture_model_path().display().to_string()
    )
    .unwrap();

    let config = RawConfig::from_file(file.path()).unwrap().resolve().unwrap();
    assert_eq!(config.port, 8500);
    assert_eq!(config.threads, 3);
    assert_eq!(config.queue_capacity, 0, "0 selects the unbounded queue");
}

#[test]
fn test_unparsable_file_is_fatal() {
    let err = RawConfig::from_toml_str("threads = [", Path::new("bad.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let err = RawConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_environment_overrides_file() {
    let file = RawConfig {
        listen: Some("127.0.0.1:1000".into()),
        threads: Some("1".into()),
        model_path: Some("/nowhere".into()),
        queue_capacity: None,
    };
    let env: HashMap<&str, String> = HashMap::from([
        (ENV_LISTEN, "127.0.0.1:2000".to_string()),
        (ENV_THREADS, "4".to_string()),
        (ENV_MODEL_PATH, common::fixture_model_path().display().to_string()),
    ]);

    let config = file.with_env(|key| env.get(key).cloned()).resolve().unwrap();
    assert_eq!(config.port, 2000);
    assert_eq!(config.threads, 4);
    assert_eq!(config.model.path(), common::fixture_model_path());
}

#[test]
fn test_bad_queue_capacity_is_fatal() {
    let mut config = raw(Some("127.0.0.1:1"), Some("1"));
    config.queue_capacity = Some("lots".into());
    assert!(matches!(config.resolve().unwrap_err(), ConfigError::InvalidQueueCapacity(_)));
}

/// Without a model path the bundled test model is used (with a warning).
#[test]
fn test_default_model_path_is_test_model() {
    let mut config = raw(Some("127.0.0.1:1"), Some("1"));
    config.model_path = None;
    let config = config.resolve().unwrap();
    assert_eq!(config.model.path(), Path::new(textpool_core::config::TEST_MODEL_PATH));
}
