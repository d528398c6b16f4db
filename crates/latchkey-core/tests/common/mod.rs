//! Protocol scenarios shared by the in-memory and Redis test suites

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};

use latchkey_common::{Clock, ManualClock, StoreConfig};
use latchkey_core::{
    AddOutcome, InsertionCache, ReadOutcome, RawCodec, ScriptedInsertionCache,
    ScriptedSessionStore, SessionData, SessionStateStore, WriteOutcome,
};
use latchkey_store::ScriptExecutor;

pub struct Harness {
    pub sessions: Arc<ScriptedSessionStore<RawCodec>>,
    pub cache: Arc<ScriptedInsertionCache<RawCodec>>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(executor: Arc<dyn ScriptExecutor>) -> Self {
        // Every harness gets its own namespace so suites can share a server
        let config = StoreConfig::memory()
            .with_key_prefix(format!("latchkey-test:{}:", uuid::Uuid::new_v4().simple()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        Self {
            sessions: Arc::new(
                ScriptedSessionStore::new(executor.clone(), RawCodec, &config)
                    .with_clock(clock.clone()),
            ),
            cache: Arc::new(
                ScriptedInsertionCache::new(executor, RawCodec, &config).with_clock(clock.clone()),
            ),
            clock,
        }
    }
}

fn payload(text: &str) -> SessionData<Bytes> {
    SessionData::new(Bytes::copy_from_slice(text.as_bytes()), Duration::from_secs(300))
}

pub async fn never_created_is_not_found(h: &Harness) {
    assert_eq!(h.sessions.get("ghost").await.unwrap(), ReadOutcome::NotFound);
    assert_eq!(
        h.sessions.get_exclusive("ghost").await.unwrap(),
        ReadOutcome::NotFound
    );
    assert!(!h.sessions.reset_timeout("ghost").await.unwrap());
}

pub async fn init_flag_is_observed_once(h: &Harness) {
    h.sessions
        .create_uninitialized("s", Duration::from_secs(120))
        .await
        .unwrap();

    let first = h.sessions.get("s").await.unwrap();
    assert!(first.was_uninitialized());
    let data = first.into_data().unwrap();
    assert!(data.items.is_empty());
    assert_eq!(data.timeout, Duration::from_secs(120));

    let second = h.sessions.get("s").await.unwrap();
    assert!(second.is_found());
    assert!(!second.was_uninitialized());
}

pub async fn exclusive_reads_race_with_one_winner(h: &Harness) {
    h.sessions
        .set_and_release("s", &payload("cart"), None, true)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sessions = h.sessions.clone();
        handles.push(tokio::spawn(
            async move { sessions.get_exclusive("s").await },
        ));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ReadOutcome::Available {
                lock: Some(lock), ..
            } => winners.push(lock),
            ReadOutcome::Locked { lock, .. } => losers.push(lock),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 7);
    assert!(losers.iter().all(|lock| lock == &winners[0]));
}

pub async fn release_honours_token(h: &Harness) {
    h.sessions
        .set_and_release("s", &payload("v1"), None, true)
        .await
        .unwrap();
    let owner = h.sessions.get_exclusive("s").await.unwrap();
    let token = owner.lock().cloned().unwrap();

    let intruder = h.sessions.get_exclusive("s").await.unwrap();
    let foreign = intruder.lock().cloned().unwrap();
    assert_eq!(foreign, token);
    assert_eq!(intruder.lock_age(), Some(Duration::ZERO));

    // A token from an acquisition that never succeeded does not release
    let stale = latchkey_core::LockToken::generate(h.clock.now());
    assert_eq!(
        h.sessions.release("s", &stale).await.unwrap(),
        WriteOutcome::LockMismatch
    );

    h.clock.advance(chrono::Duration::seconds(5));
    let still_locked = h.sessions.get("s").await.unwrap();
    assert!(still_locked.lock_age().unwrap() >= Duration::from_secs(5));

    assert_eq!(
        h.sessions.release("s", &token).await.unwrap(),
        WriteOutcome::Applied
    );
    let shared = h.sessions.get("s").await.unwrap();
    assert!(shared.is_found());
    assert!(shared.lock().is_none());
    assert!(h.sessions.get_exclusive("s").await.unwrap().lock().is_some());

    assert_eq!(
        h.sessions.release("missing", &token).await.unwrap(),
        WriteOutcome::NotFound
    );
}

pub async fn stale_write_is_a_no_op(h: &Harness) {
    h.sessions
        .set_and_release("s", &payload("original"), None, true)
        .await
        .unwrap();
    let first = h.sessions.get_exclusive("s").await.unwrap();
    let first_token = first.lock().cloned().unwrap();
    h.sessions.release("s", &first_token).await.unwrap();

    let second = h.sessions.get_exclusive("s").await.unwrap();
    let second_token = second.lock().cloned().unwrap();

    let outcome = h
        .sessions
        .set_and_release("s", &payload("overwritten"), Some(&first_token), false)
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::LockMismatch);

    // Still locked by the second owner
    let observed = h.sessions.get("s").await.unwrap();
    assert_eq!(observed.lock(), Some(&second_token));

    // Once released, the payload is the one written before either lock
    assert_eq!(
        h.sessions.release("s", &second_token).await.unwrap(),
        WriteOutcome::Applied
    );
    let unlocked = h.sessions.get("s").await.unwrap();
    assert!(unlocked.lock().is_none());
    assert_eq!(&unlocked.into_data().unwrap().items[..], b"original");

    let third = h.sessions.get_exclusive("s").await.unwrap();
    let third_token = third.lock().cloned().unwrap();
    let outcome = h
        .sessions
        .set_and_release("s", &payload("updated"), Some(&third_token), false)
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Applied);
    let data = h.sessions.get("s").await.unwrap().into_data().unwrap();
    assert_eq!(&data.items[..], b"updated");
}

pub async fn new_record_is_stored_unlocked(h: &Harness) {
    let outcome = h
        .sessions
        .set_and_release("s", &payload("fresh"), None, true)
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Applied);

    let read = h.sessions.get_exclusive("s").await.unwrap();
    assert!(!read.was_uninitialized());
    assert!(read.lock().is_some());
    let data = read.into_data().unwrap();
    assert_eq!(&data.items[..], b"fresh");
    assert_eq!(data.timeout, Duration::from_secs(300));
}

pub async fn new_record_replaces_locked_record(h: &Harness) {
    h.sessions
        .create_uninitialized("s", Duration::from_secs(60))
        .await
        .unwrap();
    h.sessions.get_exclusive("s").await.unwrap();

    h.sessions
        .set_and_release("s", &payload("replacement"), None, true)
        .await
        .unwrap();
    let read = h.sessions.get("s").await.unwrap();
    assert!(read.lock().is_none());
    assert_eq!(&read.into_data().unwrap().items[..], b"replacement");
}

pub async fn remove_honours_token(h: &Harness) {
    assert_eq!(
        h.sessions.remove("s", None).await.unwrap(),
        WriteOutcome::NotFound
    );

    h.sessions
        .set_and_release("s", &payload("x"), None, true)
        .await
        .unwrap();
    let token = h.sessions.get_exclusive("s").await.unwrap().lock().cloned().unwrap();

    assert_eq!(
        h.sessions.remove("s", None).await.unwrap(),
        WriteOutcome::LockMismatch
    );
    let other = latchkey_core::LockToken::generate(h.clock.now());
    assert_eq!(
        h.sessions.remove("s", Some(&other)).await.unwrap(),
        WriteOutcome::LockMismatch
    );
    assert!(h.sessions.get("s").await.unwrap().is_found());

    assert_eq!(
        h.sessions.remove("s", Some(&token)).await.unwrap(),
        WriteOutcome::Applied
    );
    assert_eq!(h.sessions.get("s").await.unwrap(), ReadOutcome::NotFound);

    h.sessions
        .set_and_release("t", &payload("y"), None, true)
        .await
        .unwrap();
    assert_eq!(
        h.sessions.remove("t", None).await.unwrap(),
        WriteOutcome::Applied
    );
}

pub async fn reset_timeout_ignores_lock(h: &Harness) {
    h.sessions
        .create_uninitialized("s", Duration::from_secs(60))
        .await
        .unwrap();
    h.sessions.get_exclusive("s").await.unwrap();
    assert!(h.sessions.reset_timeout("s").await.unwrap());
}

pub async fn payload_round_trips_byte_identically(h: &Harness) {
    let bytes: Vec<u8> = (0..=255u8).chain([0, 0, 255]).collect();
    let data = SessionData::new(Bytes::from(bytes.clone()), Duration::from_secs(30));
    h.sessions
        .set_and_release("bin", &data, None, true)
        .await
        .unwrap();
    let read = h.sessions.get("bin").await.unwrap().into_data().unwrap();
    assert_eq!(&read.items[..], &bytes[..]);
}

pub async fn racing_adds_agree(h: &Harness) {
    let expiry = h.clock.now() + chrono::Duration::minutes(5);
    let mut handles = Vec::new();
    for i in 0..8 {
        let cache = h.cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .add("k", &Bytes::from(format!("value-{}", i)), expiry)
                .await
        }));
    }

    let mut inserted = 0;
    let mut values = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.is_inserted() {
            inserted += 1;
        }
        values.push(outcome.into_value());
    }

    assert_eq!(inserted, 1);
    assert!(values.iter().all(|v| v == &values[0]));
    assert_eq!(h.cache.get("k").await.unwrap(), Some(values[0].clone()));
}

pub async fn set_overwrites_and_add_does_not(h: &Harness) {
    let expiry = h.clock.now() + chrono::Duration::minutes(5);
    let first = Bytes::from_static(b"first");
    let second = Bytes::from_static(b"second");

    assert_eq!(h.cache.get("k").await.unwrap(), None);
    assert_eq!(
        h.cache.add("k", &first, expiry).await.unwrap(),
        AddOutcome::Inserted(first.clone())
    );
    assert_eq!(
        h.cache.add("k", &second, expiry).await.unwrap(),
        AddOutcome::Existing(first.clone())
    );

    h.cache.set("k", &second, expiry).await.unwrap();
    assert_eq!(h.cache.get("k").await.unwrap(), Some(second.clone()));

    h.cache.remove("k").await.unwrap();
    h.cache.remove("k").await.unwrap();
    assert_eq!(h.cache.get("k").await.unwrap(), None);
}
