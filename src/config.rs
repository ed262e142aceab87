//! Configuration types for Netscope

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::{NetscopeError, Result};

/// Default viewer server port
pub const DEFAULT_PORT: u16 = 8081;

/// Default number of records kept in the store
pub const DEFAULT_MAX_REQUESTS: usize = 100;

/// Default body preview cap, in characters
pub const DEFAULT_BODY_PREVIEW_LIMIT: usize = 1000;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface the viewer server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Viewer server port (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether the host is a debuggable build; capture stays off otherwise
    #[serde(default = "default_debuggable")]
    pub debuggable: bool,
    /// Record store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Event stream settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_debuggable() -> bool {
    cfg!(debug_assertions)
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of records kept before the oldest are evicted
    pub max_requests: usize,
    /// Body preview cap in characters
    pub body_preview_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            body_preview_limit: DEFAULT_BODY_PREVIEW_LIMIT,
        }
    }
}

/// `/events` stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames buffered per connection before the oldest are dropped
    pub buffer_size: usize,
    /// Seconds between keep-alive comments on an idle stream
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            keep_alive_secs: 15,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent viewer connections
    pub max_connections: usize,
    /// How long `stop` waits for the server task, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 64,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            debuggable: default_debuggable(),
            store: StoreConfig::default(),
            stream: StreamConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NetscopeError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| NetscopeError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.store.max_requests == 0 {
            return Err(NetscopeError::ConfigError(
                "store.max_requests must be > 0".to_string(),
            ));
        }

        if self.stream.buffer_size == 0 {
            return Err(NetscopeError::ConfigError(
                "stream.buffer_size must be > 0".to_string(),
            ));
        }

        if self.stream.keep_alive_secs == 0 {
            return Err(NetscopeError::ConfigError(
                "stream.keep_alive_secs must be > 0".to_string(),
            ));
        }

        if self.limits.max_connections == 0 {
            return Err(NetscopeError::ConfigError(
                "limits.max_connections must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the viewer server binds to
    ///
    /// # Errors
    ///
    /// Returns error if `bind_address` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind_address.parse().map_err(|e| {
            NetscopeError::ConfigError(format!(
                "Invalid bind_address '{}': {e}",
                self.bind_address
            ))
        })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}
