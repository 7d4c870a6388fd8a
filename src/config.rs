use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors produced by configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("udp.remote_host must not be empty")]
    EmptyRemoteHost,
    #[error("udp.remote_port must be between 1 and 65535")]
    InvalidRemotePort,
    #[error("retry.attempt_timeout_ms must be greater than zero")]
    InvalidAttemptTimeout,
    #[error("retry.max_attempts must be greater than zero")]
    InvalidMaxAttempts,
    #[error("retry.queue_capacity must be greater than zero")]
    InvalidQueueCapacity,
    #[error("http.bind_addr must not be empty")]
    EmptyBindAddr,
    #[error("http.request_timeout_ms must be greater than zero")]
    InvalidRequestTimeout,
    #[error("http.request_id_header must not be empty")]
    EmptyRequestIdHeader,
    #[error("cache.ttl_secs must be greater than zero")]
    InvalidTtl,
    #[error("cache.cleanup_interval_secs must be greater than zero")]
    InvalidCleanupInterval,
    #[error("emulator.listen_port must be between 1 and 65535")]
    InvalidEmulatorPort,
    #[error("emulator.max_delay_ms must be greater than or equal to emulator.min_delay_ms")]
    InvalidEmulatorDelay,
    #[error("emulator.response_prefix must not be empty")]
    EmptyResponsePrefix,
}

/// Remote UDP endpoint and optional fixed local port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpEndpointConfig {
    pub remote_host: String,
    pub remote_port: u16,
    /// Local port to bind; 0 selects an ephemeral port.
    pub local_port: u16,
}

impl Default for UdpEndpointConfig {
    fn default() -> Self {
        Self {
            remote_host: "127.0.0.1".to_string(),
            remote_port: 9999,
            local_port: 0,
        }
    }
}

impl UdpEndpointConfig {
    /// The remote endpoint as a `host:port` string
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// Retry protocol knobs for the dispatch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempt_timeout_ms: u64,
    pub max_attempts: u32,
    pub delay_between_attempts_ms: u64,
    pub queue_capacity: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 500,
            max_attempts: 3,
            delay_between_attempts_ms: 0,
            queue_capacity: 128,
        }
    }
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn delay_between_attempts(&self) -> Duration {
        Duration::from_millis(self.delay_between_attempts_ms)
    }
}

/// HTTP adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub request_timeout_ms: u64,
    /// Header carrying a caller-supplied request id.
    pub request_id_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            request_timeout_ms: 2000,
            request_id_header: "x-request-id".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Response cache retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            cleanup_interval_secs: 10,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Echo emulator settings, used by the `emulator` subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub listen_port: u16,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub response_prefix: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            listen_port: 9999,
            min_delay_ms: 0,
            max_delay_ms: 250,
            response_prefix: "echo:".to_string(),
        }
    }
}

/// Top-level configuration, loaded from a TOML file.
///
/// Every section falls back to its defaults, so a partial (or absent) file
/// still yields a runnable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub udp: UdpEndpointConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub emulator: EmulatorConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check every startup rule; the first violation aborts startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.udp.remote_host.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteHost);
        }
        if self.udp.remote_port == 0 {
            return Err(ConfigError::InvalidRemotePort);
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(ConfigError::InvalidAttemptTimeout);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts);
        }
        if self.retry.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        if self.http.bind_addr.trim().is_empty() {
            return Err(ConfigError::EmptyBindAddr);
        }
        if self.http.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidRequestTimeout);
        }
        if self.http.request_id_header.trim().is_empty() {
            return Err(ConfigError::EmptyRequestIdHeader);
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidCleanupInterval);
        }
        if self.emulator.listen_port == 0 {
            return Err(ConfigError::InvalidEmulatorPort);
        }
        if self.emulator.max_delay_ms < self.emulator.min_delay_ms {
            return Err(ConfigError::InvalidEmulatorDelay);
        }
        if self.emulator.response_prefix.is_empty() {
            return Err(ConfigError::EmptyResponsePrefix);
        }
        Ok(())
    }
}
