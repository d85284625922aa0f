//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use orderbook::RepositoryConfig;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported DB_DRIVER {0:?}, expected \"inmem\" or \"postgres\"")]
    UnsupportedDriver(String),

    #[error("DATABASE_URL is required when DB_DRIVER=postgres")]
    MissingDatabaseUrl,

    #[error("unsupported LOG_FORMAT {0:?}, expected \"text\" or \"json\"")]
    UnsupportedLogFormat(String),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Event store backend selected by `DB_DRIVER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    InMemory,
    Postgres { url: String },
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedLogFormat(s.to_string())),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DB_DRIVER`: `inmem` or `postgres` (default: `inmem`)
/// - `DATABASE_URL`: required when `DB_DRIVER=postgres`
/// - `STORE_TIMEOUT_MS`: bound on each event store call (default: `5000`)
/// - `SNAPSHOT_INTERVAL`: events between snapshots, `0` disables (default: `50`)
/// - `OBSERVER_BUFFER`: capacity of the published-events channel (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database: Database,
    pub store_timeout: Duration,
    pub snapshot_interval: u64,
    pub observer_buffer: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database = match lookup("DB_DRIVER").as_deref().map(str::to_ascii_lowercase) {
            None => Database::InMemory,
            Some(driver) if driver == "inmem" => Database::InMemory,
            Some(driver) if driver == "postgres" => Database::Postgres {
                url: lookup("DATABASE_URL")
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::MissingDatabaseUrl)?,
            },
            Some(driver) => return Err(ConfigError::UnsupportedDriver(driver)),
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(format) => format.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database,
            store_timeout: parse_var(&lookup, "STORE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            snapshot_interval: parse_var(&lookup, "SNAPSHOT_INTERVAL")?
                .unwrap_or(defaults.snapshot_interval),
            observer_buffer: parse_var(&lookup, "OBSERVER_BUFFER")?
                .unwrap_or(defaults.observer_buffer),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Repository settings derived from this configuration.
    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            store_timeout: self.store_timeout,
            snapshot_interval: (self.snapshot_interval > 0).then_some(self.snapshot_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database: Database::InMemory,
            store_timeout: Duration::from_millis(5000),
            snapshot_interval: 50,
            observer_buffer: 1024,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.database, Database::InMemory);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.snapshot_interval, 50);
        assert_eq!(config.observer_buffer, 1024);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 9090,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("PORT", "3000"),
            ("LOG_FORMAT", "JSON"),
            ("STORE_TIMEOUT_MS", "250"),
            ("OBSERVER_BUFFER", "8"),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.observer_buffer, 8);
    }

    #[test]
    fn test_postgres_driver_requires_url() {
        assert_eq!(
            from_vars(&[("DB_DRIVER", "postgres")]).unwrap_err(),
            ConfigError::MissingDatabaseUrl
        );

        let config = from_vars(&[
            ("DB_DRIVER", "postgres"),
            ("DATABASE_URL", "postgres://localhost/orders"),
        ])
        .unwrap();
        assert_eq!(
            config.database,
            Database::Postgres {
                url: "postgres://localhost/orders".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_driver() {
        assert_eq!(
            from_vars(&[("DB_DRIVER", "sqlite")]).unwrap_err(),
            ConfigError::UnsupportedDriver("sqlite".to_string())
        );
    }

    #[test]
    fn test_invalid_number() {
        assert!(matches!(
            from_vars(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
    }

    #[test]
    fn test_repository_config() {
        let config = from_vars(&[("SNAPSHOT_INTERVAL", "0")]).unwrap();
        assert_eq!(config.repository_config().snapshot_interval, None);

        let config = from_vars(&[("SNAPSHOT_INTERVAL", "10")]).unwrap();
        let repo = config.repository_config();
        assert_eq!(repo.snapshot_interval, Some(10));
        assert_eq!(repo.store_timeout, Duration::from_secs(5));
    }
}
