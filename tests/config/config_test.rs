//! `Config` file-loading and CLI-flag/env-override precedence tests.
//!
//! Mutates process-global environment variables, so every test in this
//! file runs serially (the default for a single test binary) and each
//! one cleans up after itself.

use std::io::Write;

use codecrucible::config::{load_config, load_config_or_default, CliOverrides};

fn write_temp_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(contents.as_bytes()).expect("should write config");
    file
}

#[test]
fn missing_file_uses_defaults() {
    let config = load_config_or_default(
        std::path::Path::new("/nonexistent/does-not-exist.toml"),
        &CliOverrides::default(),
    )
    .expect("should fall back to defaults");
    assert_eq!(config.listen_address, "127.0.0.1:50051");
    assert_eq!(config.sandbox_image, "code-exec-sandbox:latest");
}

#[test]
fn file_values_override_defaults() {
    let file = write_temp_config(
        r#"
        listen_address = "127.0.0.1:9090"
        sandbox_image = "my-sandbox:v2"
        "#,
    );
    let config = load_config(file.path(), &CliOverrides::default()).expect("should load config");
    assert_eq!(config.listen_address, "127.0.0.1:9090");
    assert_eq!(config.sandbox_image, "my-sandbox:v2");
}

#[test]
fn cli_flag_overrides_file_value() {
    let file = write_temp_config(r#"listen_address = "127.0.0.1:9090""#);
    let overrides = CliOverrides {
        listen_address: Some("127.0.0.1:7777".to_owned()),
        ..CliOverrides::default()
    };
    let config = load_config(file.path(), &overrides).expect("should load config");
    assert_eq!(config.listen_address, "127.0.0.1:7777");
}

#[test]
fn env_override_beats_both_file_and_cli_flag() {
    let file = write_temp_config(r#"listen_address = "127.0.0.1:9090""#);
    let overrides = CliOverrides {
        listen_address: Some("127.0.0.1:7777".to_owned()),
        ..CliOverrides::default()
    };

    std::env::set_var("CODECRUCIBLE_LISTEN_ADDRESS", "0.0.0.0:1234");
    let config = load_config(file.path(), &overrides).expect("should load config");
    std::env::remove_var("CODECRUCIBLE_LISTEN_ADDRESS");

    assert_eq!(config.listen_address, "0.0.0.0:1234");
}

#[test]
fn unparseable_env_override_is_ignored() {
    std::env::set_var("CODECRUCIBLE_WORKER_COUNT", "not-a-number");
    let config = load_config_or_default(
        std::path::Path::new("/nonexistent/does-not-exist.toml"),
        &CliOverrides::default(),
    )
    .expect("should fall back to defaults");
    std::env::remove_var("CODECRUCIBLE_WORKER_COUNT");

    assert!(config.worker_count.is_none());
    assert!(config.resolved_worker_count() >= 1);
}
