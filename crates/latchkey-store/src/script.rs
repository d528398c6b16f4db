//! Atomic store procedures and their replies
//!
//! Every compound transition of the session and cache protocols is one
//! `StoreScript`, executed by the store as a single indivisible step.
//! Executors must produce identical `ScriptReply` shapes:
//!
//! | script                | reply                                                        |
//! |-----------------------|--------------------------------------------------------------|
//! | `CreateUninitialized` | `Int(1)`                                                     |
//! | `ReadRecord`          | `[Nil]` missing, `[Nil, Bulk(lock)]` locked,                 |
//! |                       | `[Bulk(data), Nil/Bulk(lock), Nil/Int(1), Nil/Bulk(timeout)]`|
//! | `ReleaseLock`         | `Int(1)` released, `Int(0)` mismatch, `Int(-1)` missing      |
//! | `RemoveRecord`        | `Int(1)` deleted, `Int(0)` mismatch, `Int(-1)` missing       |
//! | `WriteAndRelease`     | `Int(1)` written, `Int(0)` mismatch, `Int(-1)` missing       |
//! | `ResetTimeout`        | `Int(1)` touched, `Int(0)` missing                           |
//! | `CacheGet`            | `Bulk(value)` or `Nil`                                       |
//! | `CacheSet`            | `Bulk("OK")`                                                 |
//! | `CacheRemove`         | `Int(n)` keys removed                                        |
//! | `CacheAdd`            | `[Int(1), Bulk(ours)]` inserted, `[Int(0), Bulk(theirs)]`    |

use async_trait::async_trait;
use bytes::Bytes;

use latchkey_common::Result;

/// One atomic procedure against a single key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScript {
    /// Replace the record with an empty, uninitialized, unlocked one
    CreateUninitialized { data: Bytes, timeout_secs: u64 },
    /// Touch, read, and optionally lock the record in one step
    ReadRecord {
        lock: Option<String>,
        fallback_timeout_secs: u64,
    },
    /// Touch the record and drop `lock` if it matches
    ReleaseLock {
        lock: String,
        fallback_timeout_secs: u64,
    },
    /// Delete the record if the lock matches (or no lock is held when `None`)
    RemoveRecord { lock: Option<String> },
    /// Write the payload and release the lock, or replace outright for new records
    WriteAndRelease {
        data: Bytes,
        timeout_secs: u64,
        new_record: bool,
        lock: Option<String>,
    },
    /// Restore the record's expiry from its own timeout
    ResetTimeout { fallback_timeout_secs: u64 },
    CacheGet,
    CacheSet { data: Bytes, ttl_secs: u64 },
    CacheRemove,
    /// Insert if absent, otherwise return what is already there
    CacheAdd { data: Bytes, ttl_secs: u64 },
}

impl StoreScript {
    pub fn name(&self) -> &'static str {
        match self {
            StoreScript::CreateUninitialized { .. } => "create_uninitialized",
            StoreScript::ReadRecord { .. } => "read_record",
            StoreScript::ReleaseLock { .. } => "release_lock",
            StoreScript::RemoveRecord { .. } => "remove_record",
            StoreScript::WriteAndRelease { .. } => "write_and_release",
            StoreScript::ResetTimeout { .. } => "reset_timeout",
            StoreScript::CacheGet => "cache_get",
            StoreScript::CacheSet { .. } => "cache_set",
            StoreScript::CacheRemove => "cache_remove",
            StoreScript::CacheAdd { .. } => "cache_add",
        }
    }
}

/// Structured reply of a store procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    Nil,
    Int(i64),
    Bulk(Bytes),
    Array(Vec<ScriptReply>),
}

impl ScriptReply {
    pub fn bulk(value: impl Into<Bytes>) -> Self {
        ScriptReply::Bulk(value.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptReply::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptReply::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ScriptReply::Bulk(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Short shape description for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptReply::Nil => "nil",
            ScriptReply::Int(_) => "integer",
            ScriptReply::Bulk(_) => "bulk",
            ScriptReply::Array(_) => "array",
        }
    }
}

/// A store able to run `StoreScript`s atomically per key
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `script` against `key` as one indivisible step, in one round trip
    async fn execute(&self, key: &str, script: &StoreScript) -> Result<ScriptReply>;

    fn backend_name(&self) -> &'static str;
}
