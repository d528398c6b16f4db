//! Session and cache protocol tests against a live Redis server.
//!
//! Skipped unless `LATCHKEY_TEST_REDIS_URL` is set, e.g.
//! `LATCHKEY_TEST_REDIS_URL=redis://127.0.0.1:6379/15 cargo test -p latchkey-core`.

mod common;

use std::sync::Arc;

use latchkey_common::StoreConfig;
use latchkey_store::RedisScriptExecutor;

use common::Harness;

fn harness() -> Option<Harness> {
    let Ok(url) = std::env::var("LATCHKEY_TEST_REDIS_URL") else {
        eprintln!("LATCHKEY_TEST_REDIS_URL not set, skipping");
        return None;
    };
    let config = StoreConfig {
        url: Some(url),
        ..Default::default()
    };
    let executor = RedisScriptExecutor::new(&config).unwrap();
    Some(Harness::new(Arc::new(executor)))
}

macro_rules! redis_scenario {
    ($name:ident, $scenario:path) => {
        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn $name() {
            if let Some(h) = harness() {
                $scenario(&h).await;
            }
        }
    };
}

redis_scenario!(test_never_created_is_not_found, common::never_created_is_not_found);
redis_scenario!(test_init_flag_is_observed_once, common::init_flag_is_observed_once);
redis_scenario!(
    test_exclusive_reads_race_with_one_winner,
    common::exclusive_reads_race_with_one_winner
);
redis_scenario!(test_release_honours_token, common::release_honours_token);
redis_scenario!(test_stale_write_is_a_no_op, common::stale_write_is_a_no_op);
redis_scenario!(test_new_record_is_stored_unlocked, common::new_record_is_stored_unlocked);
redis_scenario!(
    test_new_record_replaces_locked_record,
    common::new_record_replaces_locked_record
);
redis_scenario!(test_remove_honours_token, common::remove_honours_token);
redis_scenario!(test_reset_timeout_ignores_lock, common::reset_timeout_ignores_lock);
redis_scenario!(
    test_payload_round_trips_byte_identically,
    common::payload_round_trips_byte_identically
);
redis_scenario!(test_racing_adds_agree, common::racing_adds_agree);
redis_scenario!(
    test_set_overwrites_and_add_does_not,
    common::set_overwrites_and_add_does_not
);
