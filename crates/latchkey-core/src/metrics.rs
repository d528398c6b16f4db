// Protocol counters published through the `metrics` facade.
// Without an installed recorder every call is a no-op.

use metrics::{counter, describe_counter};

pub const SESSION_READS: &str = "latchkey_session_reads_total";
pub const SESSION_WRITES: &str = "latchkey_session_writes_total";
pub const CACHE_ADDS: &str = "latchkey_cache_add_total";

/// Register metric descriptions; call once at startup
pub fn describe_metrics() {
    describe_counter!(SESSION_READS, "Session record reads by outcome");
    describe_counter!(
        SESSION_WRITES,
        "Session record writes, releases and removals by operation and outcome"
    );
    describe_counter!(CACHE_ADDS, "Insert-if-absent cache calls by outcome");
}

pub(crate) fn record_session_read(outcome: &'static str) {
    counter!(SESSION_READS, "outcome" => outcome).increment(1);
}

pub(crate) fn record_session_write(op: &'static str, outcome: &'static str) {
    counter!(SESSION_WRITES, "op" => op, "outcome" => outcome).increment(1);
}

pub(crate) fn record_cache_add(outcome: &'static str) {
    counter!(CACHE_ADDS, "outcome" => outcome).increment(1);
}
