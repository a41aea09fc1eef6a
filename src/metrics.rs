//! Process-wide dispatch counters.
//! Plain atomics for now; exposition beyond the periodic log line can come
//! later without touching call sites.

use std::sync::atomic::{AtomicU64, Ordering};

static ENQUEUED: AtomicU64 = AtomicU64::new(0);
static DELIVERED: AtomicU64 = AtomicU64::new(0);
static DELIVERY_RETRIED: AtomicU64 = AtomicU64::new(0);
static TRIM_EVICTED: AtomicU64 = AtomicU64::new(0);
static OVERSIZE_DISCARDED: AtomicU64 = AtomicU64::new(0);
static SHUTDOWN_REJECTED: AtomicU64 = AtomicU64::new(0);

pub fn inc_enqueued() {
    ENQUEUED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_delivered() {
    DELIVERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_delivery_retried() {
    DELIVERY_RETRIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_trim_evicted() {
    TRIM_EVICTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_oversize_discarded() {
    OVERSIZE_DISCARDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_shutdown_rejected() {
    SHUTDOWN_REJECTED.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of all counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub delivery_retried: u64,
    pub trim_evicted: u64,
    pub oversize_discarded: u64,
    pub shutdown_rejected: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        enqueued: ENQUEUED.load(Ordering::Relaxed),
        delivered: DELIVERED.load(Ordering::Relaxed),
        delivery_retried: DELIVERY_RETRIED.load(Ordering::Relaxed),
        trim_evicted: TRIM_EVICTED.load(Ordering::Relaxed),
        oversize_discarded: OVERSIZE_DISCARDED.load(Ordering::Relaxed),
        shutdown_rejected: SHUTDOWN_REJECTED.load(Ordering::Relaxed),
    }
}

/// One-line summary for the agent's periodic stats log.
pub fn log_summary() {
    let s = snapshot();
    log::debug!(
        "dispatch stats: enqueued={} delivered={} retried={} trimmed={} oversize={} rejected={}",
        s.enqueued,
        s.delivered,
        s.delivery_retried,
        s.trim_evicted,
        s.oversize_discarded,
        s.shutdown_rejected
    );
}
