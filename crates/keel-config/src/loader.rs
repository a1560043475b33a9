//! Layered configuration loader.

use crate::{ConfigError, WebConfig};
use std::env;
use std::fs;
use std::path::Path;

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "KEEL_WEB";

/// Loads a [`WebConfig`] in layers, later layers overriding earlier ones:
///
/// 1. Built-in defaults
/// 2. A TOML file, either the whole document or its `[web]` table
/// 3. Environment variables `<PREFIX>_LISTEN`, `<PREFIX>_DEBUG` and
///    `<PREFIX>_LOG_LEVEL`
///
/// # Example
///
/// ```no_run
/// use keel_config::ConfigLoader;
///
/// # fn main() -> Result<(), keel_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("config/web.toml")?
///     .load()?;
/// println!("listening on {}", config.listen);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: WebConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from defaults with the `KEEL_WEB` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    /// Loads a TOML file.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        tracing::debug!(path = %path.display(), "loading configuration file");
        self.with_toml(&content)
    }

    /// Loads a TOML file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads TOML text.
    ///
    /// ```
    /// use keel_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .without_env()
    ///     .with_toml("[web]\nlisten = \"127.0.0.1:3000\"\n[web.acl]\nenabled = true")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.listen, "127.0.0.1:3000");
    /// assert!(config.acl.enabled);
    /// ```
    pub fn with_toml(mut self, content: &str) -> Result<Self, ConfigError> {
        let mut document: toml::Table = toml::from_str(content)?;
        let section = match document.remove("web") {
            Some(toml::Value::Table(web)) => web,
            Some(other) => {
                document.insert("web".to_string(), other);
                document
            }
            None => document,
        };
        self.config = toml::Value::Table(section).try_into()?;
        Ok(self)
    }

    /// Sets the environment variable prefix.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.trim_end_matches('_').to_uppercase());
        self
    }

    /// Ignores the environment.
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(self) -> Result<WebConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating.
    pub fn load_unvalidated(mut self) -> Result<WebConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            apply_env(&mut self.config, &prefix, |key| env::var(key).ok())?;
        }
        Ok(self.config)
    }
}

fn apply_env(
    config: &mut WebConfig,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let listen = format!("{prefix}_LISTEN");
    if let Some(value) = lookup(&listen) {
        config.listen = value;
    }

    let debug = format!("{prefix}_DEBUG");
    if let Some(value) = lookup(&debug) {
        config.debug = parse_bool(&value)
            .ok_or_else(|| ConfigError::env_parse_error(&debug, "expected boolean"))?;
    }

    let level = format!("{prefix}_LOG_LEVEL");
    if let Some(value) = lookup(&level) {
        config.logging.level = value;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_whole_document_and_web_table() {
        let whole = ConfigLoader::new()
            .without_env()
            .with_toml("debug = true")
            .unwrap()
            .load()
            .unwrap();
        assert!(whole.debug);

        let embedded = ConfigLoader::new()
            .without_env()
            .with_toml("[database]\nurl = \"x\"\n[web]\ndebug = true")
            .unwrap()
            .load()
            .unwrap();
        assert!(embedded.debug);

        let unknown = ConfigLoader::new()
            .without_env()
            .with_toml("[database]\nurl = \"x\"")
            .unwrap_err();
        assert!(matches!(unknown, ConfigError::TomlError(_)));

        let only_web = ConfigLoader::new()
            .without_env()
            .with_toml("[web]\ndebug = true\n[web.audit]\nenabled = true")
            .unwrap()
            .load()
            .unwrap();
        assert!(only_web.debug);
        assert!(only_web.audit.enabled);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("APP_LISTEN", "127.0.0.1:1234"),
            ("APP_DEBUG", "yes"),
            ("APP_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = WebConfig::default();
        apply_env(&mut config, "APP", |k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.listen, "127.0.0.1:1234");
        assert!(config.debug);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_env_bool() {
        let mut config = WebConfig::default();
        let err = apply_env(&mut config, "APP", |k| {
            (k == "APP_DEBUG").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("APP_DEBUG"));
    }

    #[test]
    fn test_prefix_is_normalised() {
        let loader = ConfigLoader::new().with_env_prefix("svc_");
        assert_eq!(loader.env_prefix.as_deref(), Some("SVC"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ConfigLoader::new().with_file("/nonexistent/keel.toml"),
            Err(ConfigError::FileNotFound { .. })
        ));
        assert!(ConfigLoader::new()
            .with_optional_file("/nonexistent/keel.toml")
            .is_ok());
    }
}
