//! Integration tests for configuration resolution and loading
//!
//! Covers:
//! - Priority order (explicit path > CADENCE_CONFIG > platform default > built-ins)
//! - Missing files degrade to defaults, malformed files are errors
//! - Individual CADENCE_* overrides
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate CADENCE_* variables are marked with #[serial].

use cadence_common::config::{resolve_config_path, CadenceConfig, CONFIG_ENV_VAR};
use cadence_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var("CADENCE_UPDATE_INTERVAL_MS");
    env::remove_var("CADENCE_BATCH_SIZE");
    env::remove_var("CADENCE_MAX_QUEUE_SIZE");
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
#[serial]
fn test_explicit_path_wins_over_env() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/cadence-from-env.toml");

    let explicit = PathBuf::from("/tmp/cadence-explicit.toml");
    assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit));

    clear_env();
}

#[test]
#[serial]
fn test_env_var_used_without_explicit_path() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/cadence-from-env.toml");

    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/cadence-from-env.toml"))
    );

    clear_env();
}

#[test]
#[serial]
fn test_load_explicit_file() {
    clear_env();
    let file = write_config(
        r#"
        [scheduler]
        update_interval_ms = 5
        batch_size = 3

        [registry]
        performance_monitoring = true
        performance_interval_ms = 750

        [logging]
        level = "debug"
        "#,
    );

    let config = CadenceConfig::load(Some(file.path())).expect("config loads");
    assert_eq!(config.scheduler.update_interval_ms, 5);
    assert_eq!(config.scheduler.batch_size, 3);
    assert_eq!(config.scheduler.max_queue_size, 1000);
    assert!(config.registry.performance_monitoring);
    assert_eq!(config.registry.performance_interval_ms, 750);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let result = CadenceConfig::load(Some(std::path::Path::new(
        "/nonexistent/cadence/config.toml",
    )));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_missing_env_file_falls_back_to_defaults() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/cadence/config.toml");

    let config = CadenceConfig::load(None).expect("defaults");
    assert_eq!(config, CadenceConfig::default());

    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    clear_env();
    let file = write_config("[scheduler]\nbatch_size = \"many\"\n");
    let result = CadenceConfig::load(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    clear_env();
    let file = write_config("[scheduler]\nmax_queue_size = 0\n");
    let result = CadenceConfig::load(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_overrides_apply_on_top_of_file() {
    clear_env();
    let file = write_config("[scheduler]\nbatch_size = 3\n");
    env::set_var("CADENCE_BATCH_SIZE", "7");
    env::set_var("CADENCE_UPDATE_INTERVAL_MS", "not-a-number");
    env::set_var("CADENCE_MAX_QUEUE_SIZE", "64");

    let config = CadenceConfig::load(Some(file.path())).expect("config loads");
    assert_eq!(config.scheduler.batch_size, 7);
    // Unparsable override ignored
    assert_eq!(config.scheduler.update_interval_ms, 16);
    assert_eq!(config.scheduler.max_queue_size, 64);

    clear_env();
}
