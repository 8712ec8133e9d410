use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::db::RetryPolicy;

/// Application configuration
///
/// Load order: defaults, then the TOML file, then environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Create missing tables before serving
    pub auto_migrate: bool,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub primary_url: String,
    /// Optional read replica; empty means "use the primary"
    pub read_only_url: String,
    pub max_connections: u32,
    pub max_retry_count: u32,
    /// Upper bound for a single retry delay
    pub retry_delay_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            primary_url: "postgres://localhost/staffctl".to_string(),
            read_only_url: String::new(),
            max_connections: 10,
            max_retry_count: 10,
            retry_delay_secs: 30,
            command_timeout_secs: 600,
        }
    }
}

impl DatabaseConfig {
    pub fn read_only_url(&self) -> Option<&str> {
        let url = self.read_only_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry_count, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin (development only)
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            cors_permissive: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `~/.staffctl/config.toml`
    /// is used when present and defaults otherwise. Environment variables
    /// (including those from `.env`) override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No config file at {:?}, using defaults", default_path);
                    Self::default()
                }
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .context(format!("Failed to parse config file (invalid TOML): {:?}", path))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get config file path: ~/.staffctl/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".staffctl/config.toml")
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.primary_url = url;
        }
        if let Some(url) = lookup("DATABASE_READ_URL") {
            self.database.read_only_url = url;
        }
        if let Some(v) = lookup("STAFFCTL_DB_MAX_RETRY_COUNT") {
            self.database.max_retry_count = parse_env("STAFFCTL_DB_MAX_RETRY_COUNT", &v)?;
        }
        if let Some(v) = lookup("STAFFCTL_DB_RETRY_DELAY_SECS") {
            self.database.retry_delay_secs = parse_env("STAFFCTL_DB_RETRY_DELAY_SECS", &v)?;
        }
        if let Some(v) = lookup("STAFFCTL_DB_COMMAND_TIMEOUT_SECS") {
            self.database.command_timeout_secs =
                parse_env("STAFFCTL_DB_COMMAND_TIMEOUT_SECS", &v)?;
        }
        if let Some(host) = lookup("STAFFCTL_HOST") {
            self.server.host = host;
        }
        if let Some(v) = lookup("STAFFCTL_PORT") {
            self.server.port = parse_env("STAFFCTL_PORT", &v)?;
        }
        if let Some(v) = lookup("STAFFCTL_AUTO_MIGRATE") {
            self.auto_migrate = parse_env("STAFFCTL_AUTO_MIGRATE", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

/// Load `.env` from the current directory, then `~/.staffctl/.env`.
///
/// Existing variables are never overwritten.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from current directory: {}", path.display());
    }

    if let Some(home_dir) = dirs::home_dir() {
        let env_file = home_dir.join(".staffctl").join(".env");
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(_) => debug!("Loaded .env from ~/.staffctl: {}", env_file.display()),
                Err(e) => debug!("Failed to load ~/.staffctl/.env: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert!(!config.auto_migrate);
        assert_eq!(config.database.max_retry_count, 10);
        assert_eq!(config.database.retry_delay_secs, 30);
        assert_eq!(config.database.command_timeout(), Duration::from_secs(600));
        assert_eq!(config.database.read_only_url(), None);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:3030");
    }

    #[test]
    fn retry_policy_from_config() {
        let db = DatabaseConfig {
            max_retry_count: 3,
            retry_delay_secs: 5,
            ..DatabaseConfig::default()
        };
        let policy = db.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
auto_migrate = true

[database]
primary_url = "postgres://db.internal/staff"
read_only_url = "postgres://replica.internal/staff"

[server]
port = 8080
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(config.auto_migrate);
        assert_eq!(config.database.primary_url, "postgres://db.internal/staff");
        assert_eq!(
            config.database.read_only_url(),
            Some("postgres://replica.internal/staff")
        );
        assert_eq!(config.database.max_retry_count, 10);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\nprimary_url = 1").unwrap();
        assert!(AppConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup(&[
                ("DATABASE_URL", "postgres://env/primary"),
                ("DATABASE_READ_URL", "postgres://env/replica"),
                ("STAFFCTL_DB_MAX_RETRY_COUNT", "2"),
                ("STAFFCTL_DB_RETRY_DELAY_SECS", "7"),
                ("STAFFCTL_DB_COMMAND_TIMEOUT_SECS", "60"),
                ("STAFFCTL_HOST", "0.0.0.0"),
                ("STAFFCTL_PORT", "9000"),
                ("STAFFCTL_AUTO_MIGRATE", "true"),
            ]))
            .unwrap();

        assert_eq!(config.database.primary_url, "postgres://env/primary");
        assert_eq!(config.database.read_only_url(), Some("postgres://env/replica"));
        assert_eq!(config.database.max_retry_count, 2);
        assert_eq!(config.database.retry_delay_secs, 7);
        assert_eq!(config.database.command_timeout_secs, 60);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9000");
        assert!(config.auto_migrate);
    }

    #[test]
    fn malformed_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(lookup(&[("STAFFCTL_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("STAFFCTL_PORT"));
    }
}
