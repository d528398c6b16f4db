//! Latchkey Store - Atomic script execution
//!
//! This crate provides:
//! - The atomic procedures the protocols send to the store (`StoreScript`)
//! - The small structured reply every procedure returns (`ScriptReply`)
//! - Redis connection gateway and Lua-backed executor
//! - In-process executor with the same atomicity and reply shapes

pub mod gateway;
pub mod memory;
pub mod redis_executor;
pub mod script;

use std::sync::Arc;

use latchkey_common::{Result, StoreBackend, StoreConfig};

// Re-export commonly used types
pub use gateway::{GatewayConnection, RedisConnectionGateway};
pub use memory::MemoryScriptStore;
pub use redis_executor::RedisScriptExecutor;
pub use script::{ScriptExecutor, ScriptReply, StoreScript};

/// Build the executor selected by `config.backend`.
///
/// The configuration is validated first, so a bad address fails here
/// rather than on the first request. The in-process sweeper only starts
/// when called from within a tokio runtime.
pub fn build_executor(config: &StoreConfig) -> Result<Arc<dyn ScriptExecutor>> {
    config.validate()?;
    let executor: Arc<dyn ScriptExecutor> = match config.backend {
        StoreBackend::Redis => Arc::new(RedisScriptExecutor::new(config)?),
        StoreBackend::Memory => {
            let store = MemoryScriptStore::new();
            match config.memory_sweep_interval() {
                Some(every) if tokio::runtime::Handle::try_current().is_ok() => {
                    Arc::new(store.with_cleanup(every))
                }
                _ => Arc::new(store),
            }
        }
    };
    tracing::info!(backend = executor.backend_name(), "Script executor ready");
    Ok(executor)
}
