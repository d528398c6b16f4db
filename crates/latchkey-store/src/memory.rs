//! In-process script executor
//!
//! Each script runs while holding the DashMap shard lock for its key, which
//! gives the same per-key atomicity a Redis script has. Expiry is applied
//! lazily on access; `with_cleanup` adds a background sweeper for keys that
//! are never touched again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::{Instant, interval};
use tracing::debug;

use latchkey_common::{FIELD_DATA, FIELD_INIT, FIELD_LOCK, FIELD_TIMEOUT, LatchkeyError, Result};

use crate::script::{ScriptExecutor, ScriptReply, StoreScript};

#[derive(Debug, Clone)]
enum StoredValue {
    Hash(HashMap<String, Bytes>),
    Plain(Bytes),
}

#[derive(Debug, Default)]
struct MemoryEntry {
    value: Option<StoredValue>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn clear(&mut self) {
        self.value = None;
        self.expires_at = None;
    }

    /// EXPIRE semantics: no-op on a missing key
    fn expire(&mut self, secs: u64, now: Instant) -> bool {
        if self.value.is_none() {
            return false;
        }
        self.expires_at = Some(now + Duration::from_secs(secs));
        true
    }

    fn hash(&self) -> Result<Option<&HashMap<String, Bytes>>> {
        match &self.value {
            None => Ok(None),
            Some(StoredValue::Hash(fields)) => Ok(Some(fields)),
            Some(StoredValue::Plain(_)) => Err(wrong_type()),
        }
    }

    fn hash_mut(&mut self) -> Result<Option<&mut HashMap<String, Bytes>>> {
        match &mut self.value {
            None => Ok(None),
            Some(StoredValue::Hash(fields)) => Ok(Some(fields)),
            Some(StoredValue::Plain(_)) => Err(wrong_type()),
        }
    }

    fn field(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(self.hash()?.and_then(|fields| fields.get(name).cloned()))
    }

    fn plain(&self) -> Result<Option<Bytes>> {
        match &self.value {
            None => Ok(None),
            Some(StoredValue::Plain(bytes)) => Ok(Some(bytes.clone())),
            Some(StoredValue::Hash(_)) => Err(wrong_type()),
        }
    }

    fn ttl_from_timeout_field(&self, fallback: u64) -> Result<u64> {
        Ok(self
            .field(FIELD_TIMEOUT)?
            .and_then(|raw| parse_secs(&raw))
            .unwrap_or(fallback))
    }

    fn apply(&mut self, script: &StoreScript, now: Instant) -> Result<ScriptReply> {
        match script {
            StoreScript::CreateUninitialized { data, timeout_secs } => {
                let mut fields = HashMap::with_capacity(3);
                fields.insert(FIELD_DATA.to_string(), data.clone());
                fields.insert(FIELD_INIT.to_string(), Bytes::from_static(b"1"));
                fields.insert(FIELD_TIMEOUT.to_string(), secs_bytes(*timeout_secs));
                self.value = Some(StoredValue::Hash(fields));
                self.expire(*timeout_secs, now);
                Ok(ScriptReply::Int(1))
            }
            StoreScript::ReadRecord {
                lock,
                fallback_timeout_secs,
            } => {
                let Some(data) = self.field(FIELD_DATA)? else {
                    return Ok(ScriptReply::Array(vec![ScriptReply::Nil]));
                };
                let timeout = self.field(FIELD_TIMEOUT)?;
                let ttl = timeout
                    .as_ref()
                    .and_then(|raw| parse_secs(raw))
                    .unwrap_or(*fallback_timeout_secs);
                self.expire(ttl, now);

                if let Some(existing) = self.field(FIELD_LOCK)? {
                    return Ok(ScriptReply::Array(vec![
                        ScriptReply::Nil,
                        ScriptReply::Bulk(existing),
                    ]));
                }

                let Some(fields) = self.hash_mut()? else {
                    return Ok(ScriptReply::Array(vec![ScriptReply::Nil]));
                };
                let lock = lock.as_ref().map(|token| Bytes::from(token.clone()));
                if let Some(token) = &lock {
                    fields.insert(FIELD_LOCK.to_string(), token.clone());
                }
                let uninitialized = fields.remove(FIELD_INIT).is_some();

                Ok(ScriptReply::Array(vec![
                    ScriptReply::Bulk(data),
                    lock.map_or(ScriptReply::Nil, ScriptReply::Bulk),
                    if uninitialized {
                        ScriptReply::Int(1)
                    } else {
                        ScriptReply::Nil
                    },
                    timeout.map_or(ScriptReply::Nil, ScriptReply::Bulk),
                ]))
            }
            StoreScript::ReleaseLock {
                lock,
                fallback_timeout_secs,
            } => {
                if self.value.is_none() {
                    return Ok(ScriptReply::Int(-1));
                }
                let ttl = self.ttl_from_timeout_field(*fallback_timeout_secs)?;
                self.expire(ttl, now);
                let Some(fields) = self.hash_mut()? else {
                    return Ok(ScriptReply::Int(-1));
                };
                if fields.get(FIELD_LOCK).is_some_and(|held| held == lock.as_bytes()) {
                    fields.remove(FIELD_LOCK);
                    return Ok(ScriptReply::Int(1));
                }
                Ok(ScriptReply::Int(0))
            }
            StoreScript::RemoveRecord { lock } => {
                if self.value.is_none() {
                    return Ok(ScriptReply::Int(-1));
                }
                let held = self.field(FIELD_LOCK)?;
                let matches = match (lock, &held) {
                    (None, None) => true,
                    (Some(presented), Some(held)) => held == presented.as_bytes(),
                    _ => false,
                };
                if matches {
                    self.clear();
                    return Ok(ScriptReply::Int(1));
                }
                Ok(ScriptReply::Int(0))
            }
            StoreScript::WriteAndRelease {
                data,
                timeout_secs,
                new_record,
                lock,
            } => {
                if *new_record {
                    self.clear();
                    self.value = Some(StoredValue::Hash(HashMap::with_capacity(2)));
                } else {
                    if self.value.is_none() {
                        return Ok(ScriptReply::Int(-1));
                    }
                    let held = self.field(FIELD_LOCK)?;
                    let matches = match (lock, &held) {
                        (Some(presented), Some(held)) => held == presented.as_bytes(),
                        _ => false,
                    };
                    if !matches {
                        return Ok(ScriptReply::Int(0));
                    }
                }

                let Some(fields) = self.hash_mut()? else {
                    return Ok(ScriptReply::Int(-1));
                };
                fields.remove(FIELD_LOCK);
                fields.insert(FIELD_DATA.to_string(), data.clone());
                fields.insert(FIELD_TIMEOUT.to_string(), secs_bytes(*timeout_secs));
                self.expire(*timeout_secs, now);
                Ok(ScriptReply::Int(1))
            }
            StoreScript::ResetTimeout {
                fallback_timeout_secs,
            } => {
                let ttl = self.ttl_from_timeout_field(*fallback_timeout_secs)?;
                Ok(ScriptReply::Int(i64::from(self.expire(ttl, now))))
            }
            StoreScript::CacheGet => Ok(self.plain()?.map_or(ScriptReply::Nil, ScriptReply::Bulk)),
            StoreScript::CacheSet { data, ttl_secs } => {
                self.value = Some(StoredValue::Plain(data.clone()));
                self.expire(*ttl_secs, now);
                Ok(ScriptReply::bulk("OK"))
            }
            StoreScript::CacheRemove => {
                let existed = self.value.is_some();
                self.clear();
                Ok(ScriptReply::Int(i64::from(existed)))
            }
            StoreScript::CacheAdd { data, ttl_secs } => {
                if let Some(cached) = self.plain()? {
                    return Ok(ScriptReply::Array(vec![
                        ScriptReply::Int(0),
                        ScriptReply::Bulk(cached),
                    ]));
                }
                self.value = Some(StoredValue::Plain(data.clone()));
                self.expire(*ttl_secs, now);
                Ok(ScriptReply::Array(vec![
                    ScriptReply::Int(1),
                    ScriptReply::Bulk(data.clone()),
                ]))
            }
        }
    }
}

fn wrong_type() -> LatchkeyError {
    LatchkeyError::ProtocolViolation(
        "WRONGTYPE operation against a key holding the wrong kind of value".to_string(),
    )
}

fn parse_secs(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

fn secs_bytes(secs: u64) -> Bytes {
    Bytes::from(secs.to_string())
}

/// In-process store implementing the same scripts as the Redis executor
pub struct MemoryScriptStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
    /// Background sweeper handle
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            cleanup_handle: None,
        }
    }

    /// Start a background task that drops expired keys every `every`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_cleanup(mut self, every: Duration) -> Self {
        let entries = self.entries.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                Self::sweep_expired(&entries);
            }
        });
        self.cleanup_handle = Some(handle);
        self
    }

    fn sweep_expired(entries: &DashMap<String, MemoryEntry>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now) && entry.value.is_some());
        let removed = before.saturating_sub(entries.len());
        if removed > 0 {
            debug!(count = removed, "Swept expired in-memory records");
        }
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value.is_some() && !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of `key`, if it exists and carries an expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.value.is_none() || entry.is_expired(now) {
            return None;
        }
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

impl Default for MemoryScriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryScriptStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ScriptExecutor for MemoryScriptStore {
    async fn execute(&self, key: &str, script: &StoreScript) -> Result<ScriptReply> {
        let now = Instant::now();

        let mut entry = self.entries.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            entry.clear();
        }
        let reply = entry.apply(script, now);
        let vacant = entry.value.is_none();
        drop(entry);

        if vacant {
            self.entries.remove_if(key, |_, entry| entry.value.is_none());
        }
        reply
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
