//! Configuration management for the Latchkey server
//!
//! Layers, lowest precedence first: `conf/application.yml` (optional),
//! `LATCHKEY_*` environment variables (`__` separates nested keys, e.g.
//! `LATCHKEY_STORE__URL`), then command line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment};

use latchkey_common::{LatchkeyError, StoreBackend, StoreConfig};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "latchkey-server", version, about = "Session lock and insertion cache demo server")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(long = "redis-url", env = "REDIS_URL")]
    pub redis_url: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    #[arg(long = "key-prefix")]
    pub key_prefix: Option<String>,
    /// Store backend: redis or memory
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<StoreBackend>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(config::File::with_name(&cli.config_file).required(false))
            .add_source(
                Environment::with_prefix("latchkey")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = cli.redis_url {
            builder = builder.set_override("store.url", v)?;
        }
        if let Some(v) = cli.port {
            builder = builder.set_override("server.port", i64::from(v))?;
        }
        if let Some(v) = cli.key_prefix {
            builder = builder.set_override("store.key_prefix", v)?;
        }
        if let Some(v) = cli.backend {
            let backend = match v {
                StoreBackend::Redis => "redis",
                StoreBackend::Memory => "memory",
            };
            builder = builder.set_override("store.backend", backend)?;
        }

        Ok(Self {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // ========================================================================
    // Store Configuration
    // ========================================================================

    /// The validated `store` section; a missing section means all defaults
    pub fn store_config(&self) -> latchkey_common::Result<StoreConfig> {
        let store = match self.config.get::<StoreConfig>("store") {
            Ok(store) => store,
            Err(ConfigError::NotFound(_)) => StoreConfig::default(),
            Err(e) => {
                return Err(LatchkeyError::Configuration(format!(
                    "invalid store section: {}",
                    e
                )));
            }
        };
        store.validate()?;
        Ok(store)
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn server_workers(&self) -> Option<usize> {
        self.config
            .get_int("server.workers")
            .ok()
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
    }

    // ========================================================================
    // Session and Cache Configuration
    // ========================================================================

    /// Timeout for records created through the HTTP API; `None` uses the store default
    pub fn session_timeout(&self) -> Option<Duration> {
        self.positive_secs("session.timeout_secs")
    }

    /// Locks older than this are force-released by the HTTP API; `None` never breaks locks
    pub fn lock_stale_after(&self) -> Option<Duration> {
        self.positive_secs("session.lock_stale_after_secs")
    }

    pub fn cache_ttl(&self) -> Duration {
        self.positive_secs("cache.default_ttl_secs")
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }

    // ========================================================================
    // Observability Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("log.dir").ok().map(PathBuf::from),
            self.config.get_bool("log.console").unwrap_or(true),
            self.config.get_bool("log.file").unwrap_or(false),
            self.config
                .get_string("log.level")
                .unwrap_or("info".to_string()),
        )
    }

    pub fn metrics_enabled(&self) -> bool {
        self.config.get_bool("metrics.enabled").unwrap_or(true)
    }

    fn positive_secs(&self, key: &str) -> Option<Duration> {
        self.config
            .get_int(key)
            .ok()
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration(yaml: &str) -> Configuration {
        let config = Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap();
        Configuration::from_config(config)
    }

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.server_address(), "0.0.0.0");
        assert_eq!(configuration.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.session_timeout(), None);
        assert_eq!(configuration.lock_stale_after(), None);
        assert_eq!(configuration.cache_ttl(), Duration::from_secs(300));
        assert!(configuration.metrics_enabled());
        // Default backend is redis without an address
        assert!(configuration.store_config().is_err());
    }

    #[test]
    fn test_store_section() {
        let configuration = configuration(
            r#"
store:
  backend: memory
  key_prefix: "demo:"
  default_ttl_secs: 600
server:
  port: 9090
session:
  lock_stale_after_secs: 30
"#,
        );
        let store = configuration.store_config().unwrap();
        assert_eq!(store.backend, StoreBackend::Memory);
        assert_eq!(store.key_prefix, "demo:");
        assert_eq!(store.default_ttl_secs, 600);
        assert_eq!(configuration.server_port(), 9090);
        assert_eq!(
            configuration.lock_stale_after(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_invalid_store_section_fails() {
        let configuration = configuration(
            r#"
store:
  backend: etcd
"#,
        );
        let err = configuration.store_config().unwrap_err();
        assert!(matches!(err, LatchkeyError::Configuration(_)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.yml");
        std::fs::write(
            &path,
            "store:\n  backend: redis\n  key_prefix: \"file:\"\nserver:\n  port: 7000\n",
        )
        .unwrap();

        let cli = Cli {
            config_file: path.to_string_lossy().into_owned(),
            redis_url: None,
            port: Some(7100),
            key_prefix: Some("cli:".to_string()),
            backend: Some(StoreBackend::Memory),
        };
        let configuration = Configuration::from_cli(cli).unwrap();
        let store = configuration.store_config().unwrap();
        assert_eq!(store.backend, StoreBackend::Memory);
        assert_eq!(store.key_prefix, "cli:");
        assert_eq!(configuration.server_port(), 7100);
    }

    #[test]
    fn test_missing_file_is_optional() {
        let cli = Cli {
            config_file: "does/not/exist.yml".to_string(),
            backend: Some(StoreBackend::Memory),
            ..Default::default()
        };
        let configuration = Configuration::from_cli(cli).unwrap();
        assert!(configuration.store_config().is_ok());
    }
}
