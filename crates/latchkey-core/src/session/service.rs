//! Session lock and record protocol
//!
//! Every operation is one atomic store script and one round trip. The store
//! is the only authority: nothing about a record is cached between calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use latchkey_common::{Clock, LatchkeyError, Result, StoreConfig, SystemClock};
use latchkey_store::{ScriptExecutor, ScriptReply, StoreScript};

use super::model::*;
use crate::codec::PayloadCodec;
use crate::metrics::{record_session_read, record_session_write};
use crate::token::LockToken;

/// Session state store
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    type Item: Send + Sync;

    /// Build an empty item carrying `timeout`, without touching the store
    fn new_session_data(&self, timeout: Duration) -> SessionData<Self::Item>;

    /// Replace any record under `id` with an empty, uninitialized, unlocked one
    async fn create_uninitialized(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Read the record, taking its lock in the same step when `mode` is exclusive.
    /// Refreshes the record's expiry whenever it exists.
    async fn read(&self, id: &str, mode: AccessMode) -> Result<ReadOutcome<Self::Item>>;

    async fn get(&self, id: &str) -> Result<ReadOutcome<Self::Item>> {
        self.read(id, AccessMode::Shared).await
    }

    async fn get_exclusive(&self, id: &str) -> Result<ReadOutcome<Self::Item>> {
        self.read(id, AccessMode::Exclusive).await
    }

    /// Drop the lock if `lock` still holds it; refreshes expiry either way
    async fn release(&self, id: &str, lock: &LockToken) -> Result<WriteOutcome>;

    /// Delete the record. Without a token only an unlocked record is deleted.
    async fn remove(&self, id: &str, lock: Option<&LockToken>) -> Result<WriteOutcome>;

    /// Write `data` and release `lock`, or create the record outright when
    /// `new_record` is set
    async fn set_and_release(
        &self,
        id: &str,
        data: &SessionData<Self::Item>,
        lock: Option<&LockToken>,
        new_record: bool,
    ) -> Result<WriteOutcome>;

    /// Restore the record's expiry from its own timeout. Returns whether it existed.
    async fn reset_timeout(&self, id: &str) -> Result<bool>;
}

/// `SessionStateStore` over an atomic script executor
pub struct ScriptedSessionStore<C> {
    executor: Arc<dyn ScriptExecutor>,
    codec: C,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    default_ttl: Duration,
}

impl<C: PayloadCodec> ScriptedSessionStore<C> {
    pub fn new(executor: Arc<dyn ScriptExecutor>, codec: C, config: &StoreConfig) -> Self {
        Self {
            executor,
            codec,
            clock: Arc::new(SystemClock),
            config: config.clone(),
            default_ttl: config.default_ttl(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn key(&self, id: &str) -> String {
        self.config.record_key(id)
    }

    /// Whole seconds sent to the store; zero falls back to the default
    fn timeout_secs(&self, timeout: Duration) -> u64 {
        let timeout = if timeout.is_zero() {
            self.default_ttl
        } else {
            timeout
        };
        ceil_secs(timeout).max(1)
    }

    fn fallback_secs(&self) -> u64 {
        self.timeout_secs(self.default_ttl)
    }

    fn decode_read(
        &self,
        reply: ScriptReply,
        issued: Option<LockToken>,
    ) -> Result<ReadOutcome<C::Item>> {
        let mut parts = match reply {
            ScriptReply::Array(parts) => parts,
            other => return Err(unexpected("read_record", &other)),
        };

        match parts.len() {
            1 if parts[0].is_nil() => Ok(ReadOutcome::NotFound),
            2 if parts[0].is_nil() => {
                let lock = parse_lock(&parts[1])?;
                let age = lock.age(self.clock.now());
                Ok(ReadOutcome::Locked { lock, age })
            }
            4 => {
                let timeout = parts.pop().unwrap_or(ScriptReply::Nil);
                let init = parts.pop().unwrap_or(ScriptReply::Nil);
                let lock = parts.pop().unwrap_or(ScriptReply::Nil);
                let data = parts.pop().unwrap_or(ScriptReply::Nil);

                let data = match data {
                    ScriptReply::Bulk(data) => data,
                    other => return Err(unexpected("read_record data", &other)),
                };

                let lock = match (issued, &lock) {
                    (Some(issued), ScriptReply::Bulk(stored))
                        if stored.as_ref() == issued.as_str().as_bytes() =>
                    {
                        Some(issued)
                    }
                    (None, ScriptReply::Nil) => None,
                    _ => return Err(unexpected("read_record lock", &lock)),
                };

                let was_uninitialized = match init {
                    ScriptReply::Nil => false,
                    ScriptReply::Int(1) => true,
                    other => return Err(unexpected("read_record init", &other)),
                };

                let timeout = match &timeout {
                    ScriptReply::Nil => self.default_ttl,
                    ScriptReply::Bulk(raw) => parse_timeout(raw).unwrap_or(self.default_ttl),
                    other => return Err(unexpected("read_record timeout", other)),
                };

                Ok(ReadOutcome::Available {
                    data: SessionData::new(self.codec.decode(data)?, timeout),
                    lock,
                    was_uninitialized,
                })
            }
            _ => Err(unexpected("read_record", &ScriptReply::Array(parts))),
        }
    }

    async fn run_write(
        &self,
        op: &'static str,
        id: &str,
        script: StoreScript,
    ) -> Result<WriteOutcome> {
        let reply = self.executor.execute(&self.key(id), &script).await?;
        let outcome = match reply.as_int() {
            Some(1) => WriteOutcome::Applied,
            Some(0) => WriteOutcome::LockMismatch,
            Some(-1) => WriteOutcome::NotFound,
            _ => return Err(unexpected(script.name(), &reply)),
        };
        record_session_write(op, outcome.label());
        debug!(id, op, outcome = outcome.label(), "Session write");
        Ok(outcome)
    }
}

#[async_trait]
impl<C: PayloadCodec> SessionStateStore for ScriptedSessionStore<C> {
    type Item = C::Item;

    fn new_session_data(&self, timeout: Duration) -> SessionData<C::Item> {
        let timeout = if timeout.is_zero() {
            self.default_ttl
        } else {
            timeout
        };
        SessionData::new(C::Item::default(), timeout)
    }

    async fn create_uninitialized(&self, id: &str, timeout: Duration) -> Result<()> {
        let script = StoreScript::CreateUninitialized {
            data: self.codec.encode(&C::Item::default())?,
            timeout_secs: self.timeout_secs(timeout),
        };
        let reply = self.executor.execute(&self.key(id), &script).await?;
        if reply.as_int() != Some(1) {
            return Err(unexpected(script.name(), &reply));
        }
        record_session_write("create", WriteOutcome::Applied.label());
        debug!(id, "Created uninitialized session record");
        Ok(())
    }

    async fn read(&self, id: &str, mode: AccessMode) -> Result<ReadOutcome<C::Item>> {
        let issued = mode
            .is_exclusive()
            .then(|| LockToken::generate(self.clock.now()));
        let script = StoreScript::ReadRecord {
            lock: issued.as_ref().map(|token| token.as_str().to_string()),
            fallback_timeout_secs: self.fallback_secs(),
        };

        let reply = self.executor.execute(&self.key(id), &script).await?;
        let outcome = match self.decode_read(reply, issued.clone()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(id, error = %e, "Session read returned an unusable reply");
                // The script may have stored our token; the caller never sees it
                if let Some(token) = &issued
                    && let Err(release_error) = self.release(id, token).await
                {
                    warn!(id, error = %release_error, "Failed to release lock after unusable read");
                }
                return Err(e);
            }
        };

        record_session_read(outcome.label());
        debug!(id, ?mode, outcome = outcome.label(), "Session read");
        Ok(outcome)
    }

    async fn release(&self, id: &str, lock: &LockToken) -> Result<WriteOutcome> {
        let script = StoreScript::ReleaseLock {
            lock: lock.as_str().to_string(),
            fallback_timeout_secs: self.fallback_secs(),
        };
        self.run_write("release", id, script).await
    }

    async fn remove(&self, id: &str, lock: Option<&LockToken>) -> Result<WriteOutcome> {
        let script = StoreScript::RemoveRecord {
            lock: lock.map(|token| token.as_str().to_string()),
        };
        self.run_write("remove", id, script).await
    }

    async fn set_and_release(
        &self,
        id: &str,
        data: &SessionData<C::Item>,
        lock: Option<&LockToken>,
        new_record: bool,
    ) -> Result<WriteOutcome> {
        if lock.is_none() && !new_record {
            record_session_write("set_and_release", WriteOutcome::Rejected.label());
            warn!(id, "Refusing to overwrite an existing record without a lock token");
            return Ok(WriteOutcome::Rejected);
        }

        let script = StoreScript::WriteAndRelease {
            data: self.codec.encode(&data.items)?,
            timeout_secs: self.timeout_secs(data.timeout),
            new_record,
            lock: lock.map(|token| token.as_str().to_string()),
        };
        self.run_write("set_and_release", id, script).await
    }

    async fn reset_timeout(&self, id: &str) -> Result<bool> {
        let script = StoreScript::ResetTimeout {
            fallback_timeout_secs: self.fallback_secs(),
        };
        let reply = self.executor.execute(&self.key(id), &script).await?;
        match reply.as_int() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(unexpected(script.name(), &reply)),
        }
    }
}

pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn parse_timeout(raw: &Bytes) -> Option<Duration> {
    let secs: u64 = std::str::from_utf8(raw).ok()?.trim().parse().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_lock(reply: &ScriptReply) -> Result<LockToken> {
    let raw = reply
        .as_bytes()
        .ok_or_else(|| unexpected("read_record lock", reply))?;
    let raw = std::str::from_utf8(raw).map_err(|_| {
        LatchkeyError::ProtocolViolation("stored lock token is not valid UTF-8".to_string())
    })?;
    LockToken::parse(raw)
}

pub(crate) fn unexpected(what: &str, reply: &ScriptReply) -> LatchkeyError {
    LatchkeyError::ProtocolViolation(format!("unexpected {} reply: {:?}", what, reply))
}
