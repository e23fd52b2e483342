//! Integration tests for Configuration System

use courier::config::ConfigLoader;
use courier::{Courier, CourierConfig};
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::{with_env, MockTransport};

fn write_workspace_config(root: &std::path::Path, file: &str, contents: &str) {
    let config_dir = root.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join(file), contents).unwrap();
}

#[test]
fn test_defaults_without_any_source() {
    let workspace = TempDir::new().unwrap();
    let xdg = TempDir::new().unwrap();

    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg.path().to_str()),
            ("COURIER_ENV", None),
            ("COURIER_CACHE__DEFAULT_TTL_MS", None),
        ],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.cache.default_ttl_ms, 300_000);
    assert!(config.requests.immediate);
    assert!(config.requests.share_request);
    assert!(config.transport.base_url.is_none());
}

#[test]
fn test_layer_precedence() {
    let workspace = TempDir::new().unwrap();
    let xdg = TempDir::new().unwrap();

    let global_dir = xdg.path().join("courier");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        r#"
[cache]
default_ttl_ms = 1000

[transport]
base_url = "https://global.example.com"
timeout_ms = 100
"#,
    )
    .unwrap();

    write_workspace_config(
        workspace.path(),
        "config.toml",
        r#"
[cache]
default_ttl_ms = 2000

[requests]
immediate = false
"#,
    );
    write_workspace_config(
        workspace.path(),
        "staging.toml",
        r#"
[transport]
base_url = "https://staging.example.com"
"#,
    );

    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg.path().to_str()),
            ("COURIER_ENV", Some("staging")),
            ("COURIER_CACHE__DEFAULT_TTL_MS", Some("3000")),
        ],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    // Environment beats workspace beats global
    assert_eq!(config.cache.default_ttl_ms, 3000);
    assert!(!config.requests.immediate);
    assert_eq!(
        config.transport.base_url.as_deref(),
        Some("https://staging.example.com")
    );
    // Keys only set globally survive
    assert_eq!(config.transport.timeout_ms, 100);
}

#[test]
fn test_global_config_path_follows_xdg() {
    let xdg = TempDir::new().unwrap();
    let path = with_env(&[("XDG_CONFIG_HOME", xdg.path().to_str())], || {
        ConfigLoader::global_config_path()
    });
    assert_eq!(path, Some(xdg.path().join("courier").join("config.toml")));
}

#[test]
fn test_loaded_config_builds_courier() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("courier.toml");
    let storage_path = temp_dir.path().join("store");
    std::fs::write(
        &config_file,
        format!(
            r#"
[cache]
default_ttl_ms = 500
persistent = true
storage_path = "{}"

[requests]
share_request = false
"#,
            storage_path.display()
        ),
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());

    let courier = Courier::new(Arc::new(MockTransport::new()), config).unwrap();
    assert!(!courier.config().requests.share_request);
    assert!(storage_path.exists());
}

#[test]
fn test_invalid_logging_config_fails_validation() {
    let mut config = CourierConfig::default();
    config.logging.output = "syslog".to_string();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().starts_with("Logging:"));
}
