//! Reference processing loop: claim → handle → complete/fail.
//!
//! The queue engine itself never runs handlers. This module is the caller
//! side: it polls a queue on a cadence, wakes early on enqueue
//! notifications, runs a [`Handler`], and acks with the computed backoff.
//!
//! Delivery is at-least-once. A handler whose lease expires mid-run may see
//! its item redone by another worker; the fencing check stops the slow
//! worker from changing queue state afterwards, but not from repeating its
//! external side effects. Handlers must be idempotent.

pub mod backoff;
pub mod control;

pub use backoff::Backoff;
pub use control::{Runner, RunnerConfig};

use std::future::Future;

use crate::model::QueueItem;

/// Domain logic for one queue. Returns `Err(reason)` to fail the attempt;
/// the reason is stored as the item's `error_message`.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, item: &QueueItem) -> impl Future<Output = Result<(), String>> + Send;
}
