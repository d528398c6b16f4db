//! Session lock and record protocol
//!
//! Records live under `key_prefix + id` as a hash of `data`, `lock`, `init`
//! and `timeout`. A record moves through
//! `nonexistent -> uninitialized -> {locked <-> unlocked} -> nonexistent`;
//! stale locks are never broken automatically.

mod model;
mod service;

pub use model::*;
pub use service::*;
pub(crate) use service::{ceil_secs, unexpected};
