//! Metric instrument factories for workq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"workq"` meter. Every
//! instrument carries a `queue` label.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for workq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("workq")
}

/// Counter: items enqueued.
/// Labels: `queue`, `type`, `result` ("ok" | "duplicate").
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.enqueued")
        .with_description("Number of items enqueued")
        .build()
}

/// Counter: successful claims.
/// Labels: `queue`, `type`.
pub fn items_claimed() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.claimed")
        .with_description("Number of items claimed by workers")
        .build()
}

/// Counter: items completed.
/// Labels: `queue`.
pub fn items_completed() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.completed")
        .with_description("Number of items completed")
        .build()
}

/// Counter: failures reported by workers.
/// Labels: `queue`, `outcome` ("retry" | "dead").
pub fn items_failed() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.failed")
        .with_description("Number of item failures")
        .build()
}

/// Counter: complete/fail calls rejected because the caller no longer
/// holds the lease.
/// Labels: `queue`, `operation` ("complete" | "fail").
pub fn fencing_rejections() -> Counter<u64> {
    meter()
        .u64_counter("workq.fencing.rejections")
        .with_description("Acks rejected due to a lost lease")
        .build()
}

/// Counter: items dead-lettered after their final lease expired.
/// Labels: `queue`.
pub fn items_reaped() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.reaped")
        .with_description("Items dead-lettered by the reaper")
        .build()
}

/// Histogram: handler execution time in milliseconds.
/// Labels: `queue`, `type`, `result` ("ok" | "error").
pub fn handler_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.handler.duration_ms")
        .with_description("Handler execution time in milliseconds")
        .with_unit("ms")
        .build()
}
