//! Layered configuration loader
//!
//! Precedence, lowest to highest:
//! 1. Built-in defaults
//! 2. YAML file (gatekey.yaml)
//! 3. Environment variables (GATEKEY_* prefix)

use crate::error::{Error, Result};
use crate::types::GatekeyConfig;
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use std::str::FromStr;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "gatekey.yaml";

/// Loads [`GatekeyConfig`] from defaults, a file, and the environment
pub struct ConfigLoader {
    path: Option<Utf8PathBuf>,
    required: bool,
}

impl ConfigLoader {
    /// Loader that reads `gatekey.yaml` from `dir` when present
    pub fn with_dir(dir: impl AsRef<Utf8Path>) -> Self {
        Self {
            path: Some(dir.as_ref().join(CONFIG_FILE_NAME)),
            required: false,
        }
    }

    /// Loader that must read the given file
    pub fn with_file(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            required: true,
        }
    }

    /// Loader that only applies defaults and environment overrides
    pub fn env_only() -> Self {
        Self {
            path: None,
            required: false,
        }
    }

    /// Load, override, and validate the configuration
    pub fn load(&self) -> Result<GatekeyConfig> {
        let mut config = match &self.path {
            Some(path) if path.exists() => Self::load_yaml_file(path)?,
            Some(path) if self.required => return Err(Error::config_not_found(path.as_str())),
            _ => GatekeyConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        tracing::debug!(
            driver = %config.store.driver,
            cache_enabled = config.cache.enabled,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Path of the file this loader reads, if any
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<GatekeyConfig> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    fn apply_env_overrides(config: &mut GatekeyConfig) -> Result<()> {
        // Store
        if let Ok(val) = env::var("GATEKEY_STORE_DRIVER") {
            config.store.driver = val;
        }
        if let Ok(val) = env::var("GATEKEY_STORE_CONNECTION_STRING") {
            config.store.connection_string = val;
        }
        if let Some(val) = parse_env("GATEKEY_STORE_MAX_CONNECTIONS")? {
            config.store.max_connections = val;
        }

        // Client
        if let Ok(val) = env::var("GATEKEY_CLIENT_BASE_URL") {
            config.client.base_url = val;
        }
        if let Ok(val) = env::var("GATEKEY_CLIENT_TOKEN") {
            config.client.token = val;
        }
        if let Some(val) = parse_env("GATEKEY_CLIENT_TIMEOUT_SECS")? {
            config.client.timeout_secs = val;
        }
        if let Some(val) = parse_env("GATEKEY_CLIENT_MAX_ATTEMPTS")? {
            config.client.retry.max_attempts = val;
        }

        // Cache
        if let Some(val) = parse_env("GATEKEY_CACHE_ENABLED")? {
            config.cache.enabled = val;
        }
        if let Some(val) = parse_env("GATEKEY_CACHE_CAPACITY")? {
            config.cache.capacity = val;
        }
        if let Some(val) = parse_env("GATEKEY_CACHE_TTL_SECS")? {
            config.cache.ttl_secs = val;
        }

        // Inbound auth, comma separated
        if let Ok(val) = env::var("GATEKEY_AUTH_TOKENS") {
            config.auth.tokens = val
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} has an invalid value: {:?}", name, val))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn temp_dir() -> (Utf8PathBuf, TempDir) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("Invalid UTF-8 path");
        (dir, temp)
    }

    #[test]
    #[serial]
    fn test_load_defaults_without_file() {
        let (dir, _temp) = temp_dir();
        let config = ConfigLoader::with_dir(&dir).load().unwrap();
        assert_eq!(config.store.driver, "sqlite3");
        assert_eq!(config.cache.capacity, 10_000);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let (dir, _temp) = temp_dir();
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            r#"
store:
  driver: pgxcockroach
  connection-string: "postgres://root@localhost:26257/gatekey"
cache:
  ttl-secs: 30
"#,
        )
        .unwrap();

        let config = ConfigLoader::with_dir(&dir).load().unwrap();
        assert_eq!(config.store.driver, "pgxcockroach");
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.client.timeout_secs, 10);
    }

    #[test]
    #[serial]
    fn test_required_file_missing() {
        let (dir, _temp) = temp_dir();
        let err = ConfigLoader::with_file(dir.join("missing.yaml"))
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    #[serial]
    fn test_malformed_file() {
        let (dir, _temp) = temp_dir();
        fs::write(dir.join(CONFIG_FILE_NAME), "store: [not, a, map").unwrap();

        let err = ConfigLoader::with_dir(&dir).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let (dir, _temp) = temp_dir();
        fs::write(dir.join(CONFIG_FILE_NAME), "cache:\n  capacity: 5\n").unwrap();

        env::set_var("GATEKEY_CACHE_CAPACITY", "42");
        env::set_var("GATEKEY_CLIENT_TOKEN", "from-env");
        env::set_var("GATEKEY_AUTH_TOKENS", "a, b,,c");

        let config = ConfigLoader::with_dir(&dir).load().unwrap();
        assert_eq!(config.cache.capacity, 42);
        assert_eq!(config.client.token, "from-env");
        assert_eq!(config.auth.tokens, vec!["a", "b", "c"]);

        env::remove_var("GATEKEY_CACHE_CAPACITY");
        env::remove_var("GATEKEY_CLIENT_TOKEN");
        env::remove_var("GATEKEY_AUTH_TOKENS");
    }

    #[test]
    #[serial]
    fn test_invalid_env_number() {
        env::set_var("GATEKEY_CLIENT_TIMEOUT_SECS", "soon");

        let err = ConfigLoader::env_only().load().unwrap_err();
        assert!(err.to_string().contains("GATEKEY_CLIENT_TIMEOUT_SECS"));

        env::remove_var("GATEKEY_CLIENT_TIMEOUT_SECS");
    }
}
