//! Latchkey Core - Session lock & record protocol and insertion cache
//!
//! This crate provides:
//! - Lock tokens (`LockToken`) and payload codecs (`PayloadCodec`)
//! - The session protocol (`SessionStateStore`, `ScriptedSessionStore`)
//! - The insert-if-absent cache (`InsertionCache`, `ScriptedInsertionCache`)
//!
//! Both protocols are stateless between calls and safe to share behind an `Arc`.

pub mod cache;
pub mod codec;
pub mod metrics;
pub mod session;
pub mod token;

// Re-exports for convenience
pub use cache::{AddOutcome, InsertionCache, ScriptedInsertionCache};
pub use codec::{JsonCodec, PayloadCodec, RawCodec};
pub use session::{
    AccessMode, ReadOutcome, ScriptedSessionStore, SessionData, SessionStateStore, WriteOutcome,
};
pub use token::LockToken;
