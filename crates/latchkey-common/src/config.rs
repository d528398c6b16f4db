//! Store configuration
//!
//! Built once at startup by the host (see `latchkey-server`), validated, and
//! passed by handle into the gateway and protocol implementations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LatchkeyError, Result};
use crate::{DEFAULT_REDIS_PORT, DEFAULT_TTL_SECS};

/// Which store implementation executes the atomic scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Remote Redis server, scripts run as Lua
    #[default]
    Redis,
    /// In-process store, single node only
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = LatchkeyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(LatchkeyError::Configuration(format!(
                "unknown store backend '{}'",
                other
            ))),
        }
    }
}

/// Resolved address of a Redis server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisEndpoint {
    /// Connection URL taken verbatim from configuration
    Url(String),
    Tcp {
        host: String,
        port: u16,
        password: Option<String>,
        db: i64,
    },
}

/// Connection and keying parameters for the backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Full connection URL; takes precedence over host/port/password/db
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub password: Option<String>,
    /// Database selector
    pub db: i64,
    /// Prepended to every record id and cache key
    pub key_prefix: String,
    /// Used when a record carries no `timeout` field of its own
    pub default_ttl_secs: u64,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// Sweep period for expired in-process records; 0 leaves expiry lazy
    pub memory_sweep_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: None,
            host: None,
            port: DEFAULT_REDIS_PORT,
            password: None,
            db: 0,
            key_prefix: String::new(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            connect_timeout_ms: 5000,
            response_timeout_ms: 10000,
            memory_sweep_secs: 60,
        }
    }
}

impl StoreConfig {
    /// Configuration for the in-process backend
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Fail fast on anything that would only surface at the first round trip
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_secs == 0 {
            return Err(LatchkeyError::Configuration(
                "default_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(LatchkeyError::Configuration(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(LatchkeyError::Configuration(
                "response_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.db < 0 {
            return Err(LatchkeyError::Configuration(format!(
                "db must not be negative, got {}",
                self.db
            )));
        }
        if self.backend == StoreBackend::Redis {
            self.redis_endpoint()?;
        }
        Ok(())
    }

    /// Where the Redis backend lives.
    ///
    /// An explicit `url` wins; otherwise the endpoint is host, port,
    /// password and db kept as separate parts, so credentials are never
    /// spliced into a URL.
    pub fn redis_endpoint(&self) -> Result<RedisEndpoint> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            let supported = ["redis://", "rediss://", "redis+unix://", "unix://"];
            if !supported.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(LatchkeyError::Configuration(format!(
                    "unsupported url scheme in '{}'",
                    url
                )));
            }
            return Ok(RedisEndpoint::Url(url.to_string()));
        }

        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                LatchkeyError::Configuration("either url or host must be set".to_string())
            })?;

        if self.port == 0 {
            return Err(LatchkeyError::Configuration(
                "port must be greater than zero".to_string(),
            ));
        }

        Ok(RedisEndpoint::Tcp {
            host: host.to_string(),
            port: self.port,
            password: self.password.clone().filter(|p| !p.is_empty()),
            db: self.db,
        })
    }

    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn memory_sweep_interval(&self) -> Option<Duration> {
        (self.memory_sweep_secs > 0).then(|| Duration::from_secs(self.memory_sweep_secs))
    }
}
