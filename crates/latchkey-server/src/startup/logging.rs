//! Logging bootstrap
//!
//! Console output plus optional daily-rotated files:
//!
//! | Log File        | Component                     | Target Prefixes          |
//! |-----------------|-------------------------------|--------------------------|
//! | latchkey.log    | Root logger (all components)  | (all)                    |
//! | session.log     | Session lock & record protocol| latchkey_core::session   |
//! | store.log       | Redis gateway and executors   | latchkey_store           |
//!
//! Files live in `~/latchkey/logs` unless `log.dir` is configured.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "session.log",
        targets: &["latchkey_core::session", "latchkey_server::api::session"],
    },
    ComponentLogDef {
        file_name: "store.log",
        targets: &["latchkey_store"],
    },
];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub file_logging: bool,
    /// Used when `RUST_LOG` is not set
    pub level: Level,
    pub rotation: Rotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("latchkey").join("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
            rotation: Rotation::DAILY,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(
        log_dir: Option<PathBuf>,
        console_output: bool,
        file_logging: bool,
        level: String,
    ) -> Self {
        Self {
            log_dir: log_dir.unwrap_or_else(default_log_dir),
            console_output,
            file_logging,
            level: level.parse().unwrap_or(Level::INFO),
            rotation: Rotation::DAILY,
        }
    }
}

/// Keeps the non-blocking file writers alive; buffered output is flushed on drop
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(env_filter(config.level));
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.clone(), &config.log_dir, "latchkey.log");
        let (root_writer, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);
        layers.push(Box::new(
            fmt::layer()
                .with_writer(root_writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(env_filter(config.level)),
        ));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.clone(),
                &config.log_dir,
                component.file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let targets = component
                .targets
                .iter()
                .fold(Targets::new(), |targets, target| {
                    targets.with_target(*target, LevelFilter::TRACE)
                });
            layers.push(Box::new(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(targets),
            ));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            component_files = COMPONENT_LOGS.len(),
            "File logging initialized"
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
