//! Minimal in-process relay counters.
//! Logged at shutdown; there is no exposition endpoint.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

static EVENTS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static ALIASES_ISSUED: AtomicU64 = AtomicU64::new(0);
static DELIVERY_FAILURES: AtomicU64 = AtomicU64::new(0);

static OUTCOMES: OnceLock<Mutex<HashMap<&'static str, u64>>> = OnceLock::new();

pub fn inc_events_processed() {
    EVENTS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_aliases_issued() {
    ALIASES_ISSUED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_delivery_failures() {
    DELIVERY_FAILURES.fetch_add(1, Ordering::Relaxed);
}

fn outcomes_lock() -> &'static Mutex<HashMap<&'static str, u64>> {
    OUTCOMES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Count one terminal relay outcome (`relayed`, `too_long`, ...).
pub fn record_outcome(label: &'static str) {
    // A poisoned counter map only loses statistics
    if let Ok(mut guard) = outcomes_lock().lock() {
        let count = guard.entry(label).or_default();
        *count = count.saturating_add(1);
    }
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub events_processed: u64,
    pub aliases_issued: u64,
    pub delivery_failures: u64,
    pub outcomes: HashMap<&'static str, u64>,
}

impl Snapshot {
    pub fn outcome(&self, label: &str) -> u64 {
        self.outcomes.get(label).copied().unwrap_or(0)
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        events_processed: EVENTS_PROCESSED.load(Ordering::Relaxed),
        aliases_issued: ALIASES_ISSUED.load(Ordering::Relaxed),
        delivery_failures: DELIVERY_FAILURES.load(Ordering::Relaxed),
        outcomes: outcomes_lock().lock().map(|g| g.clone()).unwrap_or_default(),
    }
}
