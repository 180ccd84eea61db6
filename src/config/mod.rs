//! Service configuration.
//!
//! Read from a TOML file, `~/.config/estuary/config.toml` unless a path is
//! given on the command line. Missing keys fall back to defaults; the
//! result is validated before anything is started.

pub mod duration;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::app::EstuaryError;
use crate::puller::http::DEFAULT_TIMEOUT;
use crate::sync::worker::DEFAULT_WORKERS;

pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub auth_secret: Option<String>,
    pub auth_secret_file_path: Option<PathBuf>,
    /// Access token lifetime
    #[serde(with = "duration")]
    pub api_key_expiration: Duration,
    /// Refresh token lifetime
    #[serde(with = "duration")]
    pub refresh_key_expiration: Duration,
    #[serde(rename = "enableTLS")]
    pub enable_tls: bool,
    pub domain: Option<String>,
    pub cert_cache_dir: Option<PathBuf>,
    pub http_port: u16,
    #[serde(rename = "tlsPort")]
    pub tls_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_secret: None,
            auth_secret_file_path: None,
            api_key_expiration: Duration::from_secs(72 * 3600),
            refresh_key_expiration: Duration::from_secs(168 * 3600),
            enable_tls: false,
            domain: None,
            cert_cache_dir: None,
            http_port: 80,
            tls_port: 443,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Sqlite,
    Mysql,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: DatabaseType,
    pub connection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseType::Sqlite,
            connection: "/var/lib/estuary/estuary.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(with = "duration")]
    pub interval: Duration,
    /// Feeds pulled concurrently during a tick
    pub workers: usize,
    /// Network timeout of a single pull
    #[serde(with = "duration")]
    pub timeout: Duration,
    pub on_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/estuary/admin.sock"),
            max_connections: 5,
        }
    }
}

impl Config {
    /// Load and validate configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse `path` without validating it.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/estuary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("estuary").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth_secret()?;

        if self.server.enable_tls && self.server.domain.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::invalid("server.domain is required when TLS is enabled"));
        }
        if self.server.api_key_expiration.is_zero() || self.server.refresh_key_expiration.is_zero() {
            return Err(ConfigError::invalid("key expirations must be positive"));
        }

        self.database.validate()?;

        if self.sync.interval < MIN_SYNC_INTERVAL {
            return Err(ConfigError::invalid(format!(
                "sync.interval must be at least {}, got {}",
                duration::format(MIN_SYNC_INTERVAL),
                duration::format(self.sync.interval)
            )));
        }
        if self.sync.workers == 0 {
            return Err(ConfigError::invalid("sync.workers must be at least 1"));
        }
        if self.admin.max_connections == 0 {
            return Err(ConfigError::invalid("admin.maxConnections must be at least 1"));
        }
        if self.admin.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("admin.socketPath must not be empty"));
        }

        Ok(())
    }

    /// The token signing secret, from the literal or from the secret file.
    pub fn auth_secret(&self) -> Result<Vec<u8>, ConfigError> {
        let secret = match (&self.server.auth_secret, &self.server.auth_secret_file_path) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid(
                    "set only one of server.authSecret and server.authSecretFilePath",
                ))
            }
            (Some(literal), None) => literal.trim().to_string(),
            (None, Some(path)) => fs::read_to_string(path)
                .map_err(|e| ConfigError::Io {
                    path: path.clone(),
                    source: e,
                })?
                .trim()
                .to_string(),
            (None, None) => String::new(),
        };

        if secret.is_empty() {
            return Err(ConfigError::invalid("an auth secret is required"));
        }
        Ok(secret.into_bytes())
    }

    /// Annotated template for a new installation.
    pub fn default_config_content() -> String {
        r##"# Estuary configuration

[server]
# HMAC key for access and refresh tokens. Use either authSecret or
# authSecretFilePath, never both.
authSecret = "change-me"
# authSecretFilePath = "/etc/estuary/secret"
apiKeyExpiration = "72h"
refreshKeyExpiration = "168h"
enableTLS = false
# domain = "feeds.example.com"
# certCacheDir = "/var/cache/estuary"
httpPort = 80
tlsPort = 443

[database]
# sqlite | mysql | postgres
type = "sqlite"
# SQLite paths must be absolute. MySQL DSNs must carry parseTime=True.
connection = "/var/lib/estuary/estuary.db"

[sync]
# Accepts 30s, 15m, 1h, 1d or bare seconds. Minimum 1m.
interval = "15m"
workers = 4
timeout = "30s"
onStart = true

[admin]
socketPath = "/var/run/estuary/admin.sock"
maxConnections = 5
"##
        .to_string()
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let connection = self.connection.trim();
        if connection.is_empty() {
            return Err(ConfigError::invalid("database.connection must not be empty"));
        }

        match self.kind {
            DatabaseType::Sqlite => {
                if !Path::new(connection).is_absolute() {
                    return Err(ConfigError::invalid(format!(
                        "sqlite database path must be absolute: {}",
                        connection
                    )));
                }
            }
            DatabaseType::Mysql => {
                if !mysql_parses_time(connection) {
                    return Err(ConfigError::invalid(
                        "mysql connection string must include parseTime=True",
                    ));
                }
            }
            DatabaseType::Postgres => {}
        }

        Ok(())
    }
}

fn mysql_parses_time(dsn: &str) -> bool {
    let Some((_, query)) = dsn.split_once('?') else {
        return false;
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, value)| key == "parseTime" && value.eq_ignore_ascii_case("true"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

impl From<ConfigError> for EstuaryError {
    fn from(err: ConfigError) -> Self {
        EstuaryError::Config(err.to_string())
    }
}
