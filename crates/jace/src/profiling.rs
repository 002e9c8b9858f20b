//! Process-wide event counters for the translation caches.
//!
//! Counters are keyed by a static name (`lowering_cache_hit`, `compile_cache_miss`, ...)
//! and only ever grow. Tests read them through [`cache_events`] and compare deltas, so
//! concurrently running tests do not interfere as long as they look at their own stages.

use std::collections::BTreeMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

static CACHE_EVENTS: Lazy<Mutex<BTreeMap<&'static str, u64>>> =
    Lazy::new(|| Mutex::new(BTreeMap::new()));

#[inline]
pub fn cache_event(name: &'static str) {
    log::trace!("cache event {name}");
    let mut events = CACHE_EVENTS.lock().expect("cache event table poisoned");
    *events.entry(name).or_insert(0) += 1;
}

/// Returns a snapshot of every counter recorded so far.
pub fn cache_events() -> BTreeMap<&'static str, u64> {
    CACHE_EVENTS
        .lock()
        .expect("cache event table poisoned")
        .clone()
}

/// Reads a single counter, `0` if the event never fired.
pub fn cache_event_count(name: &str) -> u64 {
    CACHE_EVENTS
        .lock()
        .expect("cache event table poisoned")
        .get(name)
        .copied()
        .unwrap_or(0)
}
