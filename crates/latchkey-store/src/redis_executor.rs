//! Redis-backed script executor
//!
//! Compound procedures run as Lua scripts (EVALSHA, falling back to EVAL
//! when the script cache is cold), so each one is a single atomic step on
//! the server. Plain cache reads and writes use native commands.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::warn;

use latchkey_common::{
    FIELD_DATA, FIELD_INIT, FIELD_LOCK, FIELD_TIMEOUT, LatchkeyError, Result, StoreConfig,
};

use crate::gateway::{GatewayConnection, RedisConnectionGateway};
use crate::script::{ScriptExecutor, ScriptReply, StoreScript};

// KEYS[1] = record key
// ARGV = data field, data, init field, timeout field, timeout
static CREATE_UNINITIALIZED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2], ARGV[3], '1', ARGV[4], ARGV[5])
redis.call('EXPIRE', KEYS[1], ARGV[5])
return 1
",
    )
});

// ARGV = data field, lock field, init field, timeout field, fallback timeout, [new lock]
// Lock acquisition happens inside the same script as the read.
static READ_RECORD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local record = redis.call('HMGET', KEYS[1], ARGV[1], ARGV[2], ARGV[3], ARGV[4])
if not record[1] then
    return { false }
end
redis.call('EXPIRE', KEYS[1], tonumber(record[4]) or tonumber(ARGV[5]))
if record[2] then
    return { false, record[2] }
end
if ARGV[6] then
    redis.call('HSET', KEYS[1], ARGV[2], ARGV[6])
    record[2] = ARGV[6]
end
local uninitialized = record[3] ~= false
if uninitialized then
    redis.call('HDEL', KEYS[1], ARGV[3])
end
return { record[1], record[2], uninitialized, record[4] }
",
    )
});

// ARGV = timeout field, fallback timeout, lock field, lock
static RELEASE_LOCK: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
local timeout = tonumber(redis.call('HGET', KEYS[1], ARGV[1])) or tonumber(ARGV[2])
redis.call('EXPIRE', KEYS[1], timeout)
if redis.call('HGET', KEYS[1], ARGV[3]) == ARGV[4] then
    redis.call('HDEL', KEYS[1], ARGV[3])
    return 1
end
return 0
",
    )
});

// ARGV = lock field, [lock]
static REMOVE_RECORD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
local lock = redis.call('HGET', KEYS[1], ARGV[1])
if (not ARGV[2] and not lock) or (ARGV[2] and lock == ARGV[2]) then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
",
    )
});

// ARGV = data field, data, timeout field, timeout, new record flag, lock field, [lock]
static WRITE_AND_RELEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if ARGV[5] == '1' then
    redis.call('DEL', KEYS[1])
else
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    local lock = redis.call('HGET', KEYS[1], ARGV[6])
    if not ARGV[7] or lock ~= ARGV[7] then
        return 0
    end
    redis.call('HDEL', KEYS[1], ARGV[6])
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2], ARGV[3], ARGV[4])
redis.call('EXPIRE', KEYS[1], ARGV[4])
return 1
",
    )
});

// ARGV = timeout field, fallback timeout
static RESET_TIMEOUT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local timeout = tonumber(redis.call('HGET', KEYS[1], ARGV[1])) or tonumber(ARGV[2])
return redis.call('EXPIRE', KEYS[1], timeout)
",
    )
});

// ARGV = value, ttl seconds
static CACHE_ADD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local cached = redis.call('GET', KEYS[1])
if cached then
    return { 0, cached }
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return { 1, ARGV[1] }
",
    )
});

/// Executes store procedures on a Redis server
pub struct RedisScriptExecutor {
    gateway: RedisConnectionGateway,
    response_timeout: Duration,
}

impl RedisScriptExecutor {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            gateway: RedisConnectionGateway::new(config)?,
            response_timeout: config.response_timeout(),
        })
    }

    async fn invoke(
        connection: &mut MultiplexedConnection,
        key: &str,
        script: &StoreScript,
    ) -> redis::RedisResult<redis::Value> {
        match script {
            StoreScript::CreateUninitialized { data, timeout_secs } => {
                CREATE_UNINITIALIZED
                    .key(key)
                    .arg(FIELD_DATA)
                    .arg(&data[..])
                    .arg(FIELD_INIT)
                    .arg(FIELD_TIMEOUT)
                    .arg(*timeout_secs)
                    .invoke_async(connection)
                    .await
            }
            StoreScript::ReadRecord {
                lock,
                fallback_timeout_secs,
            } => {
                let mut invocation = READ_RECORD.prepare_invoke();
                invocation
                    .key(key)
                    .arg(FIELD_DATA)
                    .arg(FIELD_LOCK)
                    .arg(FIELD_INIT)
                    .arg(FIELD_TIMEOUT)
                    .arg(*fallback_timeout_secs);
                if let Some(lock) = lock {
                    invocation.arg(lock.as_str());
                }
                invocation.invoke_async(connection).await
            }
            StoreScript::ReleaseLock {
                lock,
                fallback_timeout_secs,
            } => {
                RELEASE_LOCK
                    .key(key)
                    .arg(FIELD_TIMEOUT)
                    .arg(*fallback_timeout_secs)
                    .arg(FIELD_LOCK)
                    .arg(lock.as_str())
                    .invoke_async(connection)
                    .await
            }
            StoreScript::RemoveRecord { lock } => {
                let mut invocation = REMOVE_RECORD.prepare_invoke();
                invocation.key(key).arg(FIELD_LOCK);
                if let Some(lock) = lock {
                    invocation.arg(lock.as_str());
                }
                invocation.invoke_async(connection).await
            }
            StoreScript::WriteAndRelease {
                data,
                timeout_secs,
                new_record,
                lock,
            } => {
                let mut invocation = WRITE_AND_RELEASE.prepare_invoke();
                invocation
                    .key(key)
                    .arg(FIELD_DATA)
                    .arg(&data[..])
                    .arg(FIELD_TIMEOUT)
                    .arg(*timeout_secs)
                    .arg(if *new_record { "1" } else { "0" })
                    .arg(FIELD_LOCK);
                if let Some(lock) = lock {
                    invocation.arg(lock.as_str());
                }
                invocation.invoke_async(connection).await
            }
            StoreScript::ResetTimeout {
                fallback_timeout_secs,
            } => {
                RESET_TIMEOUT
                    .key(key)
                    .arg(FIELD_TIMEOUT)
                    .arg(*fallback_timeout_secs)
                    .invoke_async(connection)
                    .await
            }
            StoreScript::CacheGet => redis::cmd("GET").arg(key).query_async(connection).await,
            StoreScript::CacheSet { data, ttl_secs } => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(&data[..])
                    .arg("EX")
                    .arg(*ttl_secs)
                    .query_async(connection)
                    .await
            }
            StoreScript::CacheRemove => redis::cmd("DEL").arg(key).query_async(connection).await,
            StoreScript::CacheAdd { data, ttl_secs } => {
                CACHE_ADD
                    .key(key)
                    .arg(&data[..])
                    .arg(*ttl_secs)
                    .invoke_async(connection)
                    .await
            }
        }
    }

    /// Map a failed round trip onto the error taxonomy, dropping the
    /// connection when the failure was on the wire
    async fn classify(
        &self,
        script: &StoreScript,
        generation: u64,
        err: redis::RedisError,
    ) -> LatchkeyError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            warn!(script = script.name(), error = %err, "Redis round trip failed");
            self.gateway.invalidate(generation).await;
            LatchkeyError::Transport(err.to_string())
        } else {
            warn!(script = script.name(), error = %err, "Redis rejected script");
            LatchkeyError::ProtocolViolation(format!("{} failed: {}", script.name(), err))
        }
    }
}

#[async_trait]
impl ScriptExecutor for RedisScriptExecutor {
    async fn execute(&self, key: &str, script: &StoreScript) -> Result<ScriptReply> {
        let GatewayConnection {
            mut connection,
            generation,
        } = self.gateway.connection().await?;

        let value = match tokio::time::timeout(
            self.response_timeout,
            Self::invoke(&mut connection, key, script),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => return Err(self.classify(script, generation, err).await),
            Err(_) => {
                // The script may still have committed server-side
                warn!(
                    script = script.name(),
                    timeout = ?self.response_timeout,
                    "Redis round trip timed out"
                );
                self.gateway.invalidate(generation).await;
                return Err(LatchkeyError::Transport(format!(
                    "{} timed out after {:?}",
                    script.name(),
                    self.response_timeout
                )));
            }
        };

        reply_from_value(value)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Convert a Redis reply into the executor-neutral shape
pub(crate) fn reply_from_value(value: redis::Value) -> Result<ScriptReply> {
    match value {
        redis::Value::Nil => Ok(ScriptReply::Nil),
        redis::Value::Int(n) => Ok(ScriptReply::Int(n)),
        redis::Value::Boolean(flag) => Ok(ScriptReply::Int(i64::from(flag))),
        redis::Value::BulkString(bytes) => Ok(ScriptReply::Bulk(Bytes::from(bytes))),
        redis::Value::SimpleString(status) => Ok(ScriptReply::Bulk(Bytes::from(status))),
        redis::Value::Okay => Ok(ScriptReply::Bulk(Bytes::from_static(b"OK"))),
        redis::Value::Array(items) => items
            .into_iter()
            .map(reply_from_value)
            .collect::<Result<Vec<_>>>()
            .map(ScriptReply::Array),
        other => Err(LatchkeyError::ProtocolViolation(format!(
            "unsupported reply from redis: {:?}",
            other
        ))),
    }
}
