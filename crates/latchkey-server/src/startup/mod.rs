//! Application startup utilities

pub mod logging;
pub mod telemetry;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use telemetry::init_metrics;
