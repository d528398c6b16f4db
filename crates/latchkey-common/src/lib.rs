//! Latchkey Common - Shared types, errors, and configuration
//!
//! This crate provides the foundational pieces used by every Latchkey component:
//! - Error taxonomy (`LatchkeyError`)
//! - Store configuration and its validation
//! - Wall-clock abstraction
//! - Record field names shared by the store scripts

pub mod clock;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RedisEndpoint, StoreBackend, StoreConfig};
pub use error::{LatchkeyError, Result};

/// Hash field holding the opaque record payload
pub const FIELD_DATA: &str = "data";

/// Hash field holding the lock token while a record is leased
pub const FIELD_LOCK: &str = "lock";

/// Hash field present only until the first read after creation
pub const FIELD_INIT: &str = "init";

/// Hash field holding the record's own time-to-live in seconds
pub const FIELD_TIMEOUT: &str = "timeout";

/// Default record time-to-live (20 minutes)
pub const DEFAULT_TTL_SECS: u64 = 1200;

/// Default Redis port
pub const DEFAULT_REDIS_PORT: u16 = 6379;
