//! Tests for config file resolution and TOML loading
//!
//! Note: Uses serial_test to prevent ENV variable race conditions. Tests that
//! manipulate MINTEL_TEST_CONFIG are marked with #[serial].

use mintel_common::config::{env_non_empty, load_toml, resolve_config_path};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct Sample {
    name: String,
    #[serde(default)]
    workers: usize,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var("MINTEL_TEST_CONFIG", "/tmp/from-env.toml");

    let resolved = resolve_config_path(
        Some(Path::new("/tmp/from-cli.toml")),
        "MINTEL_TEST_CONFIG",
        "mintel-ri.toml",
    );

    env::remove_var("MINTEL_TEST_CONFIG");
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));
}

#[test]
#[serial]
fn test_env_used_when_no_cli_argument() {
    env::set_var("MINTEL_TEST_CONFIG", "/tmp/from-env.toml");

    let resolved = resolve_config_path(None, "MINTEL_TEST_CONFIG", "mintel-ri.toml");

    env::remove_var("MINTEL_TEST_CONFIG");
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
}

#[test]
#[serial]
fn test_blank_env_value_is_ignored() {
    env::set_var("MINTEL_TEST_BLANK", "   ");
    assert!(env_non_empty("MINTEL_TEST_BLANK").is_none());
    env::remove_var("MINTEL_TEST_BLANK");
}

#[test]
fn test_load_toml_parses_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.toml");
    std::fs::write(&path, "name = \"report-service\"\nworkers = 3\n").unwrap();

    let sample: Sample = load_toml(&path).unwrap();
    assert_eq!(sample.name, "report-service");
    assert_eq!(sample.workers, 3);
}

#[test]
fn test_load_toml_missing_file_is_config_error() {
    let result: mintel_common::Result<Sample> =
        load_toml(Path::new("/nonexistent/mintel/sample.toml"));
    assert!(matches!(result, Err(mintel_common::Error::Config(_))));
}

#[test]
fn test_load_toml_invalid_syntax_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "name = ").unwrap();

    let result: mintel_common::Result<Sample> = load_toml(&path);
    assert!(matches!(result, Err(mintel_common::Error::Config(_))));
}
