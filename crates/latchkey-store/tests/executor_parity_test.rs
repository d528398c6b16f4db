//! Both executors must answer every script with the same reply shape.
//!
//! The Redis half runs only when `LATCHKEY_TEST_REDIS_URL` is set.

use std::sync::Arc;

use bytes::Bytes;

use latchkey_common::StoreConfig;
use latchkey_store::{
    MemoryScriptStore, RedisScriptExecutor, ScriptExecutor, ScriptReply, StoreScript,
};

fn bulk(value: &str) -> ScriptReply {
    ScriptReply::bulk(value.to_string())
}

/// Script sequence against one key with the replies it must produce
fn session_transcript() -> Vec<(StoreScript, ScriptReply)> {
    let read = |lock: Option<&str>| StoreScript::ReadRecord {
        lock: lock.map(str::to_string),
        fallback_timeout_secs: 60,
    };
    vec![
        (read(None), ScriptReply::Array(vec![ScriptReply::Nil])),
        (
            StoreScript::ResetTimeout {
                fallback_timeout_secs: 60,
            },
            ScriptReply::Int(0),
        ),
        (
            StoreScript::CreateUninitialized {
                data: Bytes::new(),
                timeout_secs: 90,
            },
            ScriptReply::Int(1),
        ),
        (
            read(Some("owner|2024-01-01T00:00:00.000000Z")),
            ScriptReply::Array(vec![
                bulk(""),
                bulk("owner|2024-01-01T00:00:00.000000Z"),
                ScriptReply::Int(1),
                bulk("90"),
            ]),
        ),
        (
            read(Some("other|2024-01-01T00:00:01.000000Z")),
            ScriptReply::Array(vec![
                ScriptReply::Nil,
                bulk("owner|2024-01-01T00:00:00.000000Z"),
            ]),
        ),
        (
            StoreScript::WriteAndRelease {
                data: Bytes::from_static(b"payload"),
                timeout_secs: 90,
                new_record: false,
                lock: Some("other|2024-01-01T00:00:01.000000Z".to_string()),
            },
            ScriptReply::Int(0),
        ),
        (
            StoreScript::WriteAndRelease {
                data: Bytes::from_static(b"payload"),
                timeout_secs: 90,
                new_record: false,
                lock: Some("owner|2024-01-01T00:00:00.000000Z".to_string()),
            },
            ScriptReply::Int(1),
        ),
        (
            read(None),
            ScriptReply::Array(vec![
                bulk("payload"),
                ScriptReply::Nil,
                ScriptReply::Nil,
                bulk("90"),
            ]),
        ),
        (
            StoreScript::ReleaseLock {
                lock: "owner|2024-01-01T00:00:00.000000Z".to_string(),
                fallback_timeout_secs: 60,
            },
            ScriptReply::Int(0),
        ),
        (
            StoreScript::ResetTimeout {
                fallback_timeout_secs: 60,
            },
            ScriptReply::Int(1),
        ),
        (
            StoreScript::RemoveRecord {
                lock: Some("owner|2024-01-01T00:00:00.000000Z".to_string()),
            },
            ScriptReply::Int(0),
        ),
        (StoreScript::RemoveRecord { lock: None }, ScriptReply::Int(1)),
        (StoreScript::RemoveRecord { lock: None }, ScriptReply::Int(-1)),
    ]
}

fn cache_transcript() -> Vec<(StoreScript, ScriptReply)> {
    vec![
        (StoreScript::CacheGet, ScriptReply::Nil),
        (
            StoreScript::CacheAdd {
                data: Bytes::from_static(b"a"),
                ttl_secs: 30,
            },
            ScriptReply::Array(vec![ScriptReply::Int(1), bulk("a")]),
        ),
        (
            StoreScript::CacheAdd {
                data: Bytes::from_static(b"b"),
                ttl_secs: 30,
            },
            ScriptReply::Array(vec![ScriptReply::Int(0), bulk("a")]),
        ),
        (
            StoreScript::CacheSet {
                data: Bytes::from_static(b"c"),
                ttl_secs: 30,
            },
            bulk("OK"),
        ),
        (StoreScript::CacheGet, bulk("c")),
        (StoreScript::CacheRemove, ScriptReply::Int(1)),
        (StoreScript::CacheRemove, ScriptReply::Int(0)),
    ]
}

async fn replay(
    executor: &dyn ScriptExecutor,
    key: &str,
    transcript: Vec<(StoreScript, ScriptReply)>,
) {
    for (step, (script, expected)) in transcript.into_iter().enumerate() {
        let reply = executor.execute(key, &script).await.unwrap();
        assert_eq!(
            reply,
            expected,
            "{} step {} ({}) diverged",
            executor.backend_name(),
            step,
            script.name()
        );
    }
}

fn executors() -> Vec<Arc<dyn ScriptExecutor>> {
    let mut executors: Vec<Arc<dyn ScriptExecutor>> = vec![Arc::new(MemoryScriptStore::new())];
    if let Ok(url) = std::env::var("LATCHKEY_TEST_REDIS_URL") {
        let config = StoreConfig {
            url: Some(url),
            ..Default::default()
        };
        executors.push(Arc::new(RedisScriptExecutor::new(&config).unwrap()));
    }
    executors
}

fn unique_key(kind: &str) -> String {
    format!("latchkey-parity:{}:{}", kind, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_session_scripts_reply_identically() {
    for executor in executors() {
        replay(executor.as_ref(), &unique_key("session"), session_transcript()).await;
    }
}

#[tokio::test]
async fn test_cache_scripts_reply_identically() {
    for executor in executors() {
        replay(executor.as_ref(), &unique_key("cache"), cache_transcript()).await;
    }
}

#[tokio::test]
async fn test_build_executor_selects_backend() {
    let executor = latchkey_store::build_executor(&StoreConfig::memory()).unwrap();
    assert_eq!(executor.backend_name(), "memory");

    let err = latchkey_store::build_executor(&StoreConfig::default()).err().unwrap();
    assert!(matches!(err, latchkey_common::LatchkeyError::Configuration(_)));
}
