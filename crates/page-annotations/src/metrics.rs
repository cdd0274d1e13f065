//! Process-wide counters for the annotator.
//!
//! Plain atomics so hosts can surface basic numbers without wiring an
//! external metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

static EXTRACT_TOTAL: AtomicU64 = AtomicU64::new(0);
static EXTRACT_CHARS: AtomicU64 = AtomicU64::new(0);
static EXTRACT_LAT_NS: AtomicU64 = AtomicU64::new(0);

static DECORATE_TOTAL: AtomicU64 = AtomicU64::new(0);
static DECORATE_LAT_NS: AtomicU64 = AtomicU64::new(0);
static ANNOTATION_SUCCESS: AtomicU64 = AtomicU64::new(0);
static ANNOTATION_FAILURE: AtomicU64 = AtomicU64::new(0);

static TAP_RESOLVED: AtomicU64 = AtomicU64::new(0);
static TAP_VETOED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricCounter {
    pub total: u64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricSnapshot {
    pub extract: MetricCounter,
    pub extracted_chars: u64,
    pub decorate: MetricCounter,
    pub annotation_successes: u64,
    pub annotation_failures: u64,
    pub taps_resolved: u64,
    pub taps_vetoed: u64,
}

pub fn record_extract(chars: usize, duration: Duration) {
    EXTRACT_TOTAL.fetch_add(1, Ordering::Relaxed);
    EXTRACT_CHARS.fetch_add(chars as u64, Ordering::Relaxed);
    EXTRACT_LAT_NS.fetch_add(duration_ns(duration), Ordering::Relaxed);
}

pub fn record_decorate(successes: usize, failures: usize, duration: Duration) {
    DECORATE_TOTAL.fetch_add(1, Ordering::Relaxed);
    ANNOTATION_SUCCESS.fetch_add(successes as u64, Ordering::Relaxed);
    ANNOTATION_FAILURE.fetch_add(failures as u64, Ordering::Relaxed);
    DECORATE_LAT_NS.fetch_add(duration_ns(duration), Ordering::Relaxed);
}

pub fn record_tap(resolved: bool) {
    if resolved {
        TAP_RESOLVED.fetch_add(1, Ordering::Relaxed);
    } else {
        TAP_VETOED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        extract: counter(&EXTRACT_TOTAL, &EXTRACT_LAT_NS),
        extracted_chars: EXTRACT_CHARS.load(Ordering::Relaxed),
        decorate: counter(&DECORATE_TOTAL, &DECORATE_LAT_NS),
        annotation_successes: ANNOTATION_SUCCESS.load(Ordering::Relaxed),
        annotation_failures: ANNOTATION_FAILURE.load(Ordering::Relaxed),
        taps_resolved: TAP_RESOLVED.load(Ordering::Relaxed),
        taps_vetoed: TAP_VETOED.load(Ordering::Relaxed),
    }
}

fn counter(total: &AtomicU64, latency_ns: &AtomicU64) -> MetricCounter {
    let total = total.load(Ordering::Relaxed);
    let avg_ms = if total == 0 {
        0.0
    } else {
        latency_ns.load(Ordering::Relaxed) as f64 / total as f64 / 1_000_000.0
    };
    MetricCounter { total, avg_ms }
}

fn duration_ns(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    if nanos > u128::from(u64::MAX) {
        u64::MAX
    } else {
        nanos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        record_tap(true);
        record_tap(false);
        record_extract(12, Duration::from_millis(1));
        let after = snapshot();
        assert!(after.taps_resolved >= before.taps_resolved + 1);
        assert!(after.taps_vetoed >= before.taps_vetoed + 1);
        assert!(after.extracted_chars >= before.extracted_chars + 12);
        assert!(serde_json::to_value(after).is_ok());
    }
}
