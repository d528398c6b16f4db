//! Redis connection lifecycle management
//!
//! Lazily opens one multiplexed connection and hands out clones of it.
//! A connection that failed a round trip is discarded with `invalidate`,
//! so the next caller establishes a fresh one.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use latchkey_common::{LatchkeyError, RedisEndpoint, Result, StoreConfig};

/// A cached connection stamped with the generation it was opened in
#[derive(Clone, Debug)]
pub struct GatewayConnection {
    pub connection: MultiplexedConnection,
    pub generation: u64,
}

/// Holds at most one connection; every stored connection gets a new generation
#[derive(Debug)]
struct ConnectionSlot<T> {
    current: Option<(u64, T)>,
    next_generation: u64,
}

impl<T: Clone> ConnectionSlot<T> {
    fn new() -> Self {
        Self {
            current: None,
            next_generation: 0,
        }
    }

    fn get(&self) -> Option<(u64, T)> {
        self.current.clone()
    }

    fn store(&mut self, connection: T) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.current = Some((generation, connection));
        generation
    }

    /// Drop the cached connection only if it is still the one from `generation`
    fn invalidate(&mut self, generation: u64) -> bool {
        if self
            .current
            .as_ref()
            .is_some_and(|(current, _)| *current == generation)
        {
            self.current = None;
            return true;
        }
        false
    }

    fn is_set(&self) -> bool {
        self.current.is_some()
    }
}

fn connection_info(endpoint: RedisEndpoint) -> Result<ConnectionInfo> {
    match endpoint {
        RedisEndpoint::Url(url) => url.as_str().into_connection_info().map_err(|e| {
            LatchkeyError::Configuration(format!("invalid redis connection url: {}", e))
        }),
        RedisEndpoint::Tcp {
            host,
            port,
            password,
            db,
        } => Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db,
                password,
                ..Default::default()
            },
        }),
    }
}

pub struct RedisConnectionGateway {
    client: redis::Client,
    connect_timeout: Duration,
    /// The mutex only avoids redundant connects; protocol correctness never depends on it
    slot: Mutex<ConnectionSlot<MultiplexedConnection>>,
}

impl RedisConnectionGateway {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let info = connection_info(config.redis_endpoint()?)?;
        let client = redis::Client::open(info).map_err(|e| {
            LatchkeyError::Configuration(format!("invalid redis connection settings: {}", e))
        })?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout(),
            slot: Mutex::new(ConnectionSlot::new()),
        })
    }

    /// Get the cached connection, establishing it first if needed
    pub async fn connection(&self) -> Result<GatewayConnection> {
        let mut slot = self.slot.lock().await;
        if let Some((generation, connection)) = slot.get() {
            return Ok(GatewayConnection {
                connection,
                generation,
            });
        }

        debug!("Connecting to redis");
        let connection = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            LatchkeyError::Transport(format!(
                "connecting to redis timed out after {:?}",
                self.connect_timeout
            ))
        })?
        .map_err(|e| LatchkeyError::Transport(format!("failed to connect to redis: {}", e)))?;

        let generation = slot.store(connection.clone());
        info!(generation, "Redis connection established");
        Ok(GatewayConnection {
            connection,
            generation,
        })
    }

    /// Drop the connection of `generation` after a transport failure on it.
    /// A newer connection opened in the meantime is left alone.
    pub async fn invalidate(&self, generation: u64) {
        if self.slot.lock().await.invalidate(generation) {
            warn!(generation, "Discarded broken redis connection, next call reconnects");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_set()
    }
}

impl std::fmt::Debug for RedisConnectionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnectionGateway")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
