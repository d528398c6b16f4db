use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use latchkey_common::{Clock, Result, StoreConfig, SystemClock};
use latchkey_store::{ScriptExecutor, ScriptReply, StoreScript};

use crate::codec::PayloadCodec;
use crate::metrics::record_cache_add;
use crate::session::{ceil_secs, unexpected};

/// Result of an insert-if-absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome<T> {
    /// The caller's item was stored
    Inserted(T),
    /// An entry already existed and was left untouched
    Existing(T),
}

impl<T> AddOutcome<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, AddOutcome::Inserted(_))
    }

    /// The value now in the cache, whoever wrote it
    pub fn value(&self) -> &T {
        match self {
            AddOutcome::Inserted(value) | AddOutcome::Existing(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            AddOutcome::Inserted(value) | AddOutcome::Existing(value) => value,
        }
    }
}

#[async_trait]
pub trait InsertionCache: Send + Sync {
    type Item: Send + Sync;

    async fn get(&self, key: &str) -> Result<Option<Self::Item>>;

    /// Overwrite unconditionally, expiring at `expiry`
    async fn set(&self, key: &str, item: &Self::Item, expiry: DateTime<Utc>) -> Result<()>;

    /// Delete; an absent key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Store `item` unless an entry exists; returns whichever value is cached afterwards
    async fn add(
        &self,
        key: &str,
        item: &Self::Item,
        expiry: DateTime<Utc>,
    ) -> Result<AddOutcome<Self::Item>>;
}

/// `InsertionCache` over an atomic script executor
pub struct ScriptedInsertionCache<C> {
    executor: Arc<dyn ScriptExecutor>,
    codec: C,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl<C: PayloadCodec> ScriptedInsertionCache<C> {
    pub fn new(executor: Arc<dyn ScriptExecutor>, codec: C, config: &StoreConfig) -> Self {
        Self {
            executor,
            codec,
            clock: Arc::new(SystemClock),
            config: config.clone(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn key(&self, key: &str) -> String {
        self.config.record_key(key)
    }

    /// Remaining lifetime rounded up to whole seconds, at least one
    fn ttl_secs(&self, expiry: DateTime<Utc>) -> u64 {
        let remaining = (expiry - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        ceil_secs(remaining).max(1)
    }
}

#[async_trait]
impl<C: PayloadCodec> InsertionCache for ScriptedInsertionCache<C> {
    type Item = C::Item;

    async fn get(&self, key: &str) -> Result<Option<C::Item>> {
        let script = StoreScript::CacheGet;
        match self.executor.execute(&self.key(key), &script).await? {
            ScriptReply::Nil => Ok(None),
            ScriptReply::Bulk(bytes) => self.codec.decode(bytes).map(Some),
            other => Err(unexpected(script.name(), &other)),
        }
    }

    async fn set(&self, key: &str, item: &C::Item, expiry: DateTime<Utc>) -> Result<()> {
        let script = StoreScript::CacheSet {
            data: self.codec.encode(item)?,
            ttl_secs: self.ttl_secs(expiry),
        };
        match self.executor.execute(&self.key(key), &script).await? {
            ScriptReply::Bulk(_) => Ok(()),
            other => Err(unexpected(script.name(), &other)),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let script = StoreScript::CacheRemove;
        match self.executor.execute(&self.key(key), &script).await? {
            ScriptReply::Int(_) => Ok(()),
            other => Err(unexpected(script.name(), &other)),
        }
    }

    async fn add(
        &self,
        key: &str,
        item: &C::Item,
        expiry: DateTime<Utc>,
    ) -> Result<AddOutcome<C::Item>> {
        let script = StoreScript::CacheAdd {
            data: self.codec.encode(item)?,
            ttl_secs: self.ttl_secs(expiry),
        };
        let reply = self.executor.execute(&self.key(key), &script).await?;

        let parts = match reply {
            ScriptReply::Array(parts) => parts,
            other => return Err(unexpected(script.name(), &other)),
        };
        let (inserted, payload) = match <[ScriptReply; 2]>::try_from(parts) {
            Ok([ScriptReply::Int(flag @ (0 | 1)), ScriptReply::Bulk(payload)]) => {
                (flag == 1, payload)
            }
            Ok(parts) => {
                return Err(unexpected(script.name(), &ScriptReply::Array(parts.to_vec())));
            }
            Err(parts) => return Err(unexpected(script.name(), &ScriptReply::Array(parts))),
        };

        let value = self.codec.decode(payload)?;
        let outcome = if inserted {
            AddOutcome::Inserted(value)
        } else {
            AddOutcome::Existing(value)
        };
        let label = if inserted { "inserted" } else { "existing" };
        record_cache_add(label);
        debug!(key, outcome = label, "Cache add");
        Ok(outcome)
    }
}
