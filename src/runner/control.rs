//! Runner loop: waits for work, claims it, runs the handler, acks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

use super::{Backoff, Handler};
use crate::db::Queue;
use crate::error::Result;
use crate::model::WorkerId;
use crate::telemetry::metrics;
use crate::telemetry::span::{record_outcome, start_item_span};

/// Configuration for a runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Poll interval fallback when no NOTIFY arrives.
    pub poll_interval: Duration,
    /// How often to dead-letter items whose final lease expired.
    pub reap_interval: Duration,
    /// Delay policy passed to `fail`.
    pub backoff: Backoff,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reap_interval: Duration::from_secs(60),
            backoff: Backoff::default(),
        }
    }
}

/// One worker polling one queue. Spawn several with distinct worker ids for
/// parallelism; they coordinate only through the queue table.
pub struct Runner<H: Handler> {
    queue: Queue,
    worker: WorkerId,
    handler: Arc<H>,
    config: RunnerConfig,
    stopping: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl<H: Handler> Clone for Runner<H> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            worker: self.worker.clone(),
            handler: Arc::clone(&self.handler),
            config: self.config.clone(),
            stopping: Arc::clone(&self.stopping),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<H: Handler> Runner<H> {
    pub fn new(queue: Queue, worker: WorkerId, handler: Arc<H>, config: RunnerConfig) -> Self {
        Self {
            queue,
            worker,
            handler,
            config,
            stopping: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker
    }

    /// Signal the runner to stop after its current item.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Run the loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut listener = sqlx::postgres::PgListener::connect_with(self.queue.pool()).await?;
        listener.listen(&self.queue.name().channel()).await?;

        info!(queue = %self.queue.name(), worker = %self.worker, "runner started");

        let mut next_reap = Instant::now();

        loop {
            if self.is_stopping() {
                info!(worker = %self.worker, "runner shutting down");
                return Ok(());
            }

            if Instant::now() >= next_reap {
                if let Err(e) = self.queue.reap_exhausted().await {
                    warn!("reap error: {e}");
                }
                next_reap = Instant::now() + self.config.reap_interval;
            }

            let processed = match self.run_once().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!(retryable = e.is_retryable(), "run_once error: {e}");
                    false
                }
            };
            if processed {
                // Keep draining while work is available
                continue;
            }

            tokio::select! {
                _ = self.shutdown.notified() => {}
                notif = listener.recv() => {
                    match notif {
                        Ok(_) => debug!(queue = %self.queue.name(), "notified of new work"),
                        Err(e) => warn!("PgListener error: {e}, falling back to poll"),
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Claim and process at most one item. Returns whether an item was
    /// claimed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(item) = self.queue.claim_next(&self.worker).await? else {
            return Ok(false);
        };

        let queue_name = self.queue.name().to_string();
        let span = start_item_span(&queue_name, &item);
        let started = Instant::now();

        let result = self.handler.handle(&item).instrument(span.clone()).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::handler_duration_ms().record(
            elapsed_ms,
            &[
                KeyValue::new("queue", queue_name),
                KeyValue::new("type", item.item_type.clone()),
                KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
            ],
        );

        let acked = match result {
            Ok(()) => {
                record_outcome(&span, "completed");
                self.queue.complete(item.id, &self.worker).await?
            }
            Err(reason) => {
                let outcome = if item.is_final_attempt() { "dead" } else { "retry" };
                record_outcome(&span, outcome);
                let backoff = self.config.backoff.delay_for(item.retry_count);
                self.queue
                    .fail(item.id, &self.worker, &reason, backoff)
                    .await?
            }
        };

        if acked == 0 {
            // Lease lost while handling; the new owner decides the outcome.
            debug!(id = %item.id, worker = %self.worker, "ack ignored, item reassigned");
        }
        Ok(true)
    }
}
