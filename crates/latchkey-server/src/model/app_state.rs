//! Shared handler state

use std::sync::Arc;
use std::time::Duration;

use latchkey_common::StoreConfig;
use latchkey_core::{
    InsertionCache, JsonCodec, ScriptedInsertionCache, ScriptedSessionStore, SessionStateStore,
};
use latchkey_store::ScriptExecutor;

use super::config::Configuration;

/// Items of one session record, stored as a JSON object
pub type SessionItems = serde_json::Map<String, serde_json::Value>;

pub struct AppState {
    pub sessions: Arc<dyn SessionStateStore<Item = SessionItems>>,
    pub cache: Arc<dyn InsertionCache<Item = serde_json::Value>>,
    /// Timeout for records created through the API
    pub session_timeout: Duration,
    pub cache_ttl: Duration,
    pub lock_stale_after: Option<Duration>,
}

impl AppState {
    pub fn new(
        executor: Arc<dyn ScriptExecutor>,
        store: &StoreConfig,
        configuration: &Configuration,
    ) -> Self {
        Self {
            sessions: Arc::new(ScriptedSessionStore::new(
                executor.clone(),
                JsonCodec::<SessionItems>::new(),
                store,
            )),
            cache: Arc::new(ScriptedInsertionCache::new(
                executor,
                JsonCodec::<serde_json::Value>::new(),
                store,
            )),
            session_timeout: configuration
                .session_timeout()
                .unwrap_or(store.default_ttl()),
            cache_ttl: configuration.cache_ttl(),
            lock_stale_after: configuration.lock_stale_after(),
        }
    }
}
