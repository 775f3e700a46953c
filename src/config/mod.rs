//! Configuration management
//!
//! This module handles loading and parsing configuration for the user service
//! and the forwarding proxy. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The resulting
//! `Config` is built once at startup and passed into the components that need it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// User service HTTP server
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Password hashing parameters
    #[serde(default)]
    pub password: PasswordConfig,
    /// Forwarding proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    15
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Maximum lifetime of a pooled connection
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_seconds: u64,
    /// Connection attempts before giving up at startup
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            max_lifetime_seconds: default_max_lifetime(),
            connect_retries: default_connect_retries(),
        }
    }
}

impl DatabaseConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds)
    }
}

fn default_database_url() -> String {
    "data/usergate.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_max_lifetime() -> u64 {
    3600
}

fn default_connect_retries() -> u32 {
    5
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of an issued session (default: 24 hours)
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
    /// How often the sweeper purges expired sessions (default: 1 hour)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Name of the cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Report unknown usernames as invalid credentials at the HTTP layer
    #[serde(default)]
    pub generic_login_errors: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            cookie_name: default_cookie_name(),
            generic_login_errors: false,
        }
    }
}

impl SessionConfig {
    /// Session lifetime, capped at `MAX_SESSION_TTL_SECONDS`
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds.min(MAX_SESSION_TTL_SECONDS))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Longest session lifetime `validate` accepts (one year)
pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

fn default_session_ttl() -> i64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

fn default_cookie_name() -> String {
    "session_token".to_string()
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

// Defaults are sized to the work factor of bcrypt cost 14: about a second
// per hash on server hardware.
fn default_memory_kib() -> u32 {
    64 * 1024
}

fn default_iterations() -> u32 {
    6
}

fn default_parallelism() -> u32 {
    1
}

/// Forwarding proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Base URL of the user service
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Path prefixes forwarded to the upstream
    #[serde(default = "default_forwarded_prefixes")]
    pub forwarded_prefixes: Vec<String>,
    /// Value of the `X-Proxy` marker header added to forwarded requests
    #[serde(default = "default_marker")]
    pub marker: String,
    /// CORS allowed origin
    #[serde(default = "default_proxy_cors_origin")]
    pub cors_origin: String,
    /// Timeout for a single upstream round-trip
    #[serde(default = "default_proxy_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_proxy_port(),
            upstream_url: default_upstream_url(),
            forwarded_prefixes: default_forwarded_prefixes(),
            marker: default_marker(),
            cors_origin: default_proxy_cors_origin(),
            request_timeout_seconds: default_proxy_timeout(),
        }
    }
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_upstream_url() -> String {
    "http://user-service:8000".to_string()
}

fn default_forwarded_prefixes() -> Vec<String> {
    vec!["/auth/".to_string(), "/users/".to_string()]
}

fn default_marker() -> String {
    "Social Network Proxy".to_string()
}

fn default_proxy_cors_origin() -> String {
    "*".to_string()
}

fn default_proxy_timeout() -> u64 {
    30
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `USERGATE_<SECTION>_<KEY>`:
    /// - USERGATE_SERVER_HOST / USERGATE_SERVER_PORT
    /// - USERGATE_DATABASE_DRIVER / USERGATE_DATABASE_URL
    /// - USERGATE_DATABASE_MAX_CONNECTIONS
    /// - USERGATE_SESSION_TTL_SECONDS / USERGATE_SESSION_SWEEP_INTERVAL_SECONDS
    /// - USERGATE_PROXY_PORT / USERGATE_PROXY_UPSTREAM_URL
    ///
    /// The merged result is validated before it is returned.
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the service misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_seconds <= 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_seconds must be positive".to_string(),
            ));
        }
        if self.session.ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "session.ttl_seconds must not exceed {}",
                MAX_SESSION_TTL_SECONDS
            )));
        }
        if self.session.sweep_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session.sweep_interval_seconds must be positive".to_string(),
            ));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session.cookie_name cannot be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be positive".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.proxy.upstream_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "proxy.upstream_url is not a valid URL: {}",
                self.proxy.upstream_url
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("USERGATE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parsed::<u16>("USERGATE_SERVER_PORT") {
            self.server.port = port;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("USERGATE_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("USERGATE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = env_parsed::<u32>("USERGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = max;
        }

        // Session configuration
        if let Some(ttl) = env_parsed::<i64>("USERGATE_SESSION_TTL_SECONDS") {
            self.session.ttl_seconds = ttl;
        }
        if let Some(interval) = env_parsed::<u64>("USERGATE_SESSION_SWEEP_INTERVAL_SECONDS") {
            self.session.sweep_interval_seconds = interval;
        }

        // Proxy configuration
        if let Some(port) = env_parsed::<u16>("USERGATE_PROXY_PORT") {
            self.proxy.port = port;
        }
        if let Ok(url) = std::env::var("USERGATE_PROXY_UPSTREAM_URL") {
            self.proxy.upstream_url = url;
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
