//! Configuration for holdctl

use hold_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldConfig {
    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registry tuning
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    /// Postgres storage at `url`, keeping pool settings if already configured.
    pub fn with_database_url(self, url: String) -> Self {
        match self {
            StorageConfig::Postgres {
                max_connections,
                connect_timeout_secs,
                ..
            } => StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            },
            StorageConfig::Memory => StorageConfig::Postgres {
                url,
                max_connections: default_pool_size(),
                connect_timeout_secs: default_connection_timeout(),
            },
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl HoldConfig {
    /// Load configuration: defaults, then the file if given, then
    /// `HOLD_`-prefixed environment variables (`HOLD_STORAGE__URL`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&HoldConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HOLD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = HoldConfig::default();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.registry.max_conflict_retries, 5);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HoldConfig::load(None).unwrap();
        assert_eq!(config.registry.max_conflict_retries, 5);
    }

    #[test]
    fn test_load_postgres_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[storage]
type = "postgres"
url = "postgres://hold@localhost/hold"

[registry]
max_conflict_retries = 9
"#
        )
        .unwrap();

        let config = HoldConfig::load(file.path().to_str()).unwrap();
        match config.storage {
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                assert_eq!(url, "postgres://hold@localhost/hold");
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            StorageConfig::Memory => panic!("expected postgres storage"),
        }
        assert_eq!(config.registry.max_conflict_retries, 9);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(HoldConfig::load(Some("/nonexistent/holdctl.toml")).is_err());
    }

    #[test]
    fn test_database_url_keeps_pool_settings() {
        let storage = StorageConfig::Postgres {
            url: "postgres://old".to_string(),
            max_connections: 3,
            connect_timeout_secs: 1,
        }
        .with_database_url("postgres://new".to_string());
        assert!(matches!(
            storage,
            StorageConfig::Postgres { ref url, max_connections: 3, connect_timeout_secs: 1 }
                if url == "postgres://new"
        ));
    }
}
