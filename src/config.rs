//! Runtime configuration for the CLI and server
//!
//! Defaults < JSON config file < environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "NEXUS_DB_PATH";
pub const ENV_BIND_ADDR: &str = "NEXUS_BIND_ADDR";
pub const ENV_LOG: &str = "NEXUS_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite scenario store
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// tracing EnvFilter directive
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("nexus.db")
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            log_filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// File (if given) then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup(ENV_DB_PATH) {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        self
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the config.
pub fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.db_path, PathBuf::from("nexus.db"));
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bind_addr": "127.0.0.1:8080"}}"#).unwrap();
        file.flush().unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("nexus.db"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DB_PATH, "/tmp/cap.db"), (ENV_LOG, "debug")]);

        let config = AppConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.db_path, PathBuf::from("/tmp/cap.db"));
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_missing_file_errors() {
        let err = AppConfig::from_file(Path::new("/nonexistent/nexus.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
