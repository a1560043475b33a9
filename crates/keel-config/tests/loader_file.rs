//! Loading configuration from files on disk.

use keel_config::{ConfigError, ConfigLoader, LogFormat};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_loads_web_table_from_file() {
    let file = write_config(
        r#"
        [web]
        listen = "127.0.0.1:8088"

        [web.auth]
        enabled = true
        whitelist = ["^/public", "^/public"]

        [web.logging]
        level = "warn"
        format = "pretty"
        "#,
    );

    let config = ConfigLoader::new()
        .without_env()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.listen_addr().unwrap().port(), 8088);
    assert!(config.auth.enabled);
    assert_eq!(config.auth.whitelist.len(), 2);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn test_invalid_file_content_is_reported() {
    let file = write_config("listen = 5");
    let err = ConfigLoader::new()
        .without_env()
        .with_file(file.path())
        .unwrap_err();
    assert!(matches!(err, ConfigError::TomlError(_)));
}

#[test]
fn test_validation_runs_on_load() {
    let file = write_config("[auth]\nsessionExpireInHours = 1000");
    let err = ConfigLoader::new()
        .without_env()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("auth.sessionExpireInHours"));
}
