//! Item processing span helpers.
//!
//! Provides span creation and outcome recording for items flowing through a
//! runner.

use tracing::Span;

use crate::model::QueueItem;

/// Start a span for one handler invocation.
///
/// The `item.outcome` field is declared empty and can be filled via
/// [`record_outcome`].
pub fn start_item_span(queue: &str, item: &QueueItem) -> Span {
    tracing::info_span!(
        "workq.handle",
        "queue.name" = queue,
        "item.id" = %item.id,
        "item.type" = %item.item_type,
        "item.attempt" = item.retry_count,
        "item.outcome" = tracing::field::Empty,
    )
}

/// Record the handler outcome on the span and emit an event inside it.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("item.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome = outcome, "item_outcome");
    });
}
