//! Configuration management for the admin backend
//!
//! Loads configuration with priority:
//! 1. config.toml (or specified config file)
//! 2. Environment variables (fallback)
//! 3. Defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Control-plane database holding connection profiles
    #[serde(default)]
    pub admin_db: AdminDbConfig,

    /// Pool sizing and timeouts for target databases
    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Control-plane database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDbConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,

    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default = "default_admin_database")]
    pub database: String,

    #[serde(default = "default_admin_user")]
    pub user: String,

    /// Can reference an env var with ${VAR_NAME}
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_admin_max_connections")]
    pub admin_max_connections: u32,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Bound on waiting for a session, including establishing a new one
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret the credential cipher key is derived from
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AdminDbConfig {
    fn default() -> Self {
        Self {
            host: default_admin_host(),
            port: default_pg_port(),
            database: default_admin_database(),
            user: default_admin_user(),
            password: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            admin_max_connections: default_admin_max_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl QuadConfig {
    /// Load configuration with the following priority:
    /// 1. config.toml in current directory or a parent
    /// 2. Environment variables (fallback)
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file. Without a path, falls back to
    /// environment variables and defaults when no config.toml can be found.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::find_config_file()?,
        };

        let mut config = match config_path {
            Some(config_path) => {
                tracing::debug!("Loading configuration from: {:?}", config_path);

                let contents = fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

                toml::from_str::<QuadConfig>(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
            }
            None => {
                tracing::debug!("No config.toml found, using environment and defaults");
                QuadConfig::default()
            }
        };

        config.resolve_env_vars();

        Ok(config)
    }

    /// Find config.toml by searching current directory and parents
    fn find_config_file() -> Result<Option<PathBuf>> {
        let mut current = env::current_dir()?;

        loop {
            let config_path = current.join("config.toml");
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Resolve ${VAR_NAME} references and apply environment fallbacks
    fn resolve_env_vars(&mut self) {
        if let Ok(host) = env::var("ADMIN_DB_HOST") {
            self.admin_db.host = host;
        }
        if let Some(port) = env::var("ADMIN_DB_PORT").ok().and_then(|p| p.parse().ok()) {
            self.admin_db.port = port;
        }
        if let Ok(database) = env::var("ADMIN_DB_NAME") {
            self.admin_db.database = database;
        }
        if let Ok(user) = env::var("ADMIN_DB_USER") {
            self.admin_db.user = user;
        }

        self.admin_db.password = match self.admin_db.password.take() {
            Some(password) => Self::resolve_env_var(&password),
            None => env::var("ADMIN_DB_PASSWORD").ok(),
        };

        self.security.encryption_key = match self.security.encryption_key.take() {
            Some(key) => Self::resolve_env_var(&key),
            None => env::var("ENCRYPTION_KEY").ok(),
        };
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }

    /// Secret for the credential cipher, with a clear error when unset
    pub fn encryption_key(&self) -> crate::Result<&str> {
        self.security
            .encryption_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                crate::Error::config_error(
                    "Encryption key not found. Configure it in config.toml:\n\
                    [security]\n\
                    encryption_key = \"${ENCRYPTION_KEY}\"\n\
                    \n\
                    Or set environment variable:\n\
                    export ENCRYPTION_KEY=\"your-secret\"",
                )
            })
    }

    /// Create test-friendly defaults (no database or secrets required)
    pub fn test_defaults() -> Self {
        Self {
            security: SecurityConfig {
                encryption_key: Some("test-encryption-key".to_string()),
            },
            ..Self::default()
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_admin_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_admin_database() -> String {
    "quad-admin-panel".to_string()
}

fn default_admin_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_admin_max_connections() -> u32 {
    20
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    2
}

fn default_log_filter() -> String {
    "info".to_string()
}
