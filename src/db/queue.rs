//! Queue item operations: enqueue, lease-based claim, fenced ack/fail,
//! listing.
//!
//! Every state change is one conditional statement against the queue table.
//! Claims lock their candidate row with `FOR UPDATE SKIP LOCKED`, so
//! concurrent workers each get a distinct row without blocking on each
//! other. `complete` and `fail` match on `status = 'processing' AND
//! worker_id = $worker`; a worker whose lease was taken over affects zero
//! rows and must treat that as "too late", not as an error.
//!
//! All timestamps come from the database clock.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::QueueName;

const COLUMNS: &str = r#"id, "type", payload, status, retry_count, max_retries, visibility_timeout_secs,
    visible_at, worker_id, started_at, completed_at, failed_at, error_message, created_at, updated_at"#;

/// Longest delay honoured by [`Queue::fail`] backoffs and
/// [`VisibleAt::After`]. Longer durations are clamped to this, since a
/// Postgres interval cannot hold `i64::MAX` milliseconds.
pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Error recorded on items dead-lettered by [`Queue::reap_exhausted`].
pub const REAPED_ERROR: &str = "lease expired on final attempt";

/// Handle to a single queue table. Cheap to clone.
#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
    name: QueueName,
    table: String,
}

impl Queue {
    pub(crate) fn new(pool: PgPool, name: QueueName) -> Self {
        let table = name.table();
        Self { pool, name, table }
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn label(&self) -> KeyValue {
        KeyValue::new("queue", self.name.to_string())
    }

    /// Insert a new pending item. Fails with [`Error::DuplicateId`] if the id
    /// is already present in this queue.
    pub async fn enqueue(&self, new: NewItem) -> Result<QueueItem> {
        new.validate()?;

        let (at, delay_ms) = match new.visible_at {
            VisibleAt::Now => (None, 0i64),
            VisibleAt::After(delay) => (None, duration_millis(delay)),
            VisibleAt::At(at) => (Some(at), 0i64),
        };

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"INSERT INTO {table} (id, "type", payload, status, retry_count, max_retries,
                   visibility_timeout_secs, visible_at, created_at, updated_at)
               VALUES ($1, $2, $3, 'pending', 0, $4, $5,
                   COALESCE($6::timestamptz, now() + $7::bigint * interval '1 millisecond'),
                   now(), now())
               ON CONFLICT (id) DO NOTHING
               RETURNING {COLUMNS}"#,
            table = self.table,
        );
        let row: Option<QueueItemRow> = sqlx::query_as(&sql)
            .bind(new.id.0)
            .bind(&new.item_type)
            .bind(&new.payload)
            .bind(new.max_retries as i32)
            .bind(new.visibility_timeout_secs as i32)
            .bind(at)
            .bind(delay_ms)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            metrics::items_enqueued().add(
                1,
                &[
                    self.label(),
                    KeyValue::new("type", new.item_type.clone()),
                    KeyValue::new("result", "duplicate"),
                ],
            );
            debug!(queue = %self.name, id = %new.id, "duplicate enqueue");
            return Err(Error::DuplicateId(new.id.to_string()));
        };

        // NOTIFY is transactional, only fires on commit. Empty payload: the
        // notification is a wake-up only and payloads are capped at 8000 bytes.
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(self.name.channel())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::items_enqueued().add(
            1,
            &[
                self.label(),
                KeyValue::new("type", new.item_type),
                KeyValue::new("result", "ok"),
            ],
        );

        let item = row.try_into_item()?;
        debug!(queue = %self.name, id = %item.id, item_type = %item.item_type, visible_at = %item.visible_at, "enqueued");
        Ok(item)
    }

    /// Lease the oldest-due claimable item to `worker`, or return `None` when
    /// nothing is due.
    ///
    /// Claimable means pending or processing with an expired lease, due, and
    /// `retry_count <= max_retries`. The claim bumps `retry_count`, stamps
    /// `started_at` and `worker_id`, and moves `visible_at` to the lease
    /// expiry. A crashed worker's item becomes claimable again once that
    /// expiry passes.
    pub async fn claim_next(&self, worker: &WorkerId) -> Result<Option<QueueItem>> {
        let sql = format!(
            r#"UPDATE {table}
               SET status = 'processing',
                   started_at = now(),
                   visible_at = now() + visibility_timeout_secs * interval '1 second',
                   retry_count = retry_count + 1,
                   worker_id = $1,
                   updated_at = now()
               WHERE id = (
                   SELECT id FROM {table}
                   WHERE status IN ('pending', 'processing')
                     AND visible_at <= now()
                     AND retry_count <= max_retries
                   ORDER BY visible_at ASC
                   LIMIT 1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING {COLUMNS}"#,
            table = self.table,
        );
        let row: Option<QueueItemRow> = sqlx::query_as(&sql)
            .bind(worker.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let item = row.try_into_item()?;

        metrics::items_claimed().add(
            1,
            &[self.label(), KeyValue::new("type", item.item_type.clone())],
        );
        debug!(
            queue = %self.name,
            id = %item.id,
            worker = %worker,
            attempt = item.retry_count,
            lease_expires_at = %item.visible_at,
            "claimed"
        );
        Ok(Some(item))
    }

    /// Mark an item completed. Returns the number of rows affected: 0 means
    /// `worker` no longer holds the lease (or the item already finished).
    pub async fn complete(&self, id: ItemId, worker: &WorkerId) -> Result<u64> {
        let sql = format!(
            "UPDATE {table}
             SET status = 'completed', completed_at = now(), worker_id = NULL, updated_at = now()
             WHERE id = $1 AND status = 'processing' AND worker_id = $2",
            table = self.table,
        );
        let rows_affected = sqlx::query(&sql)
            .bind(id.0)
            .bind(worker.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            self.fenced("complete", id, worker);
        } else {
            metrics::items_completed().add(1, &[self.label()]);
            debug!(queue = %self.name, %id, worker = %worker, "completed");
        }
        Ok(rows_affected)
    }

    /// Record a failed attempt. If the attempt just made was the last one the
    /// item moves to `dead`; otherwise it returns to `pending` and becomes
    /// claimable again after `backoff`. Returns rows affected with the same
    /// fencing semantics as [`Queue::complete`].
    pub async fn fail(
        &self,
        id: ItemId,
        worker: &WorkerId,
        error_message: &str,
        backoff: Duration,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {table}
             SET status = CASE WHEN retry_count > max_retries THEN 'dead' ELSE 'pending' END,
                 visible_at = CASE WHEN retry_count > max_retries THEN visible_at
                                   ELSE now() + $4::bigint * interval '1 millisecond' END,
                 failed_at = now(),
                 error_message = $3,
                 worker_id = NULL,
                 updated_at = now()
             WHERE id = $1 AND status = 'processing' AND worker_id = $2
             RETURNING status, retry_count",
            table = self.table,
        );
        let row: Option<(String, i32)> = sqlx::query_as(&sql)
            .bind(id.0)
            .bind(worker.as_str())
            .bind(error_message)
            .bind(duration_millis(backoff))
            .fetch_optional(&self.pool)
            .await?;

        let Some((status, retry_count)) = row else {
            self.fenced("fail", id, worker);
            return Ok(0);
        };

        match status.parse::<Status>()? {
            Status::Dead => {
                metrics::items_failed().add(1, &[self.label(), KeyValue::new("outcome", "dead")]);
                info!(queue = %self.name, %id, retry_count, error = error_message, "dead-lettered");
            }
            _ => {
                metrics::items_failed().add(1, &[self.label(), KeyValue::new("outcome", "retry")]);
                debug!(
                    queue = %self.name,
                    %id,
                    retry_count,
                    backoff_ms = duration_millis(backoff),
                    error = error_message,
                    "failed, will retry"
                );
            }
        }
        Ok(1)
    }

    /// Items of one type, newest first. For audit and debugging only.
    pub async fn list_by_type(&self, item_type: &str, limit: u32) -> Result<Vec<QueueItem>> {
        let sql = format!(
            r#"SELECT {COLUMNS} FROM {table}
               WHERE "type" = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
            table = self.table,
        );
        let rows: Vec<QueueItemRow> = sqlx::query_as(&sql)
            .bind(item_type)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueItemRow::try_into_item).collect()
    }

    /// Get an item by ID.
    pub async fn get(&self, id: ItemId) -> Result<QueueItem> {
        let sql = format!("SELECT {COLUMNS} FROM {table} WHERE id = $1", table = self.table);
        let row: Option<QueueItemRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| Error::NotFound(format!("{}/{id}", self.name)))?
            .try_into_item()
    }

    /// Item counts per status.
    pub async fn stats(&self) -> Result<QueueStats> {
        let sql = format!(
            "SELECT status, count(*) FROM {table} GROUP BY status",
            table = self.table
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.add(status.parse()?, count as u64);
        }
        Ok(stats)
    }

    /// Dead-letter items whose final attempt's lease expired without an ack.
    ///
    /// Such items are past their retry budget, so no claim will ever pick
    /// them up again, and their worker is gone so no `fail` will arrive.
    /// Returns the number of items moved to `dead`.
    pub async fn reap_exhausted(&self) -> Result<u64> {
        let sql = format!(
            "UPDATE {table}
             SET status = 'dead', failed_at = now(), error_message = $1,
                 worker_id = NULL, updated_at = now()
             WHERE id IN (
                 SELECT id FROM {table}
                 WHERE status = 'processing'
                   AND visible_at <= now()
                   AND retry_count > max_retries
                 FOR UPDATE SKIP LOCKED
             )",
            table = self.table,
        );
        let reaped = sqlx::query(&sql)
            .bind(REAPED_ERROR)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if reaped > 0 {
            metrics::items_reaped().add(reaped, &[self.label()]);
            info!(queue = %self.name, reaped, "dead-lettered expired final attempts");
        }
        Ok(reaped)
    }

    fn fenced(&self, operation: &'static str, id: ItemId, worker: &WorkerId) {
        metrics::fencing_rejections().add(
            1,
            &[self.label(), KeyValue::new("operation", operation)],
        );
        warn!(queue = %self.name, %id, worker = %worker, operation, "lease not held, ack rejected");
    }
}

fn duration_millis(d: Duration) -> i64 {
    // MAX_DELAY in millis fits an i64 with room to spare
    d.min(MAX_DELAY).as_millis() as i64
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct QueueItemRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    item_type: String,
    payload: serde_json::Value,
    status: String,
    retry_count: i32,
    max_retries: i32,
    visibility_timeout_secs: i32,
    visible_at: DateTime<Utc>,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QueueItemRow {
    fn try_into_item(self) -> Result<QueueItem> {
        Ok(QueueItem {
            id: ItemId(self.id),
            item_type: self.item_type,
            payload: self.payload,
            status: self.status.parse()?,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            visibility_timeout_secs: self.visibility_timeout_secs as u32,
            visible_at: self.visible_at,
            worker_id: self.worker_id.map(WorkerId),
            started_at: self.started_at,
            completed_at: self.completed_at,
            failed_at: self.failed_at,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> QueueItemRow {
        let now = Utc::now();
        QueueItemRow {
            id: Uuid::new_v4(),
            item_type: "send_notification".into(),
            payload: serde_json::json!({"user": 7}),
            status: status.into(),
            retry_count: 1,
            max_retries: 3,
            visibility_timeout_secs: 30,
            visible_at: now,
            worker_id: Some("w1".into()),
            started_at: Some(now),
            completed_at: None,
            failed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_maps_to_domain_item() {
        let item = row("processing").try_into_item().unwrap();
        assert_eq!(item.status, Status::Processing);
        assert_eq!(item.item_type, "send_notification");
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.max_retries, 3);
        assert_eq!(item.worker_id, Some(WorkerId::new("w1")));
        assert_eq!(item.payload["user"], 7);
        assert_eq!(item.lease_expires_at(), Some(item.visible_at));
    }

    #[test]
    fn row_with_unknown_status_is_rejected() {
        assert!(matches!(
            row("archived").try_into_item(),
            Err(Error::UnknownStatus(_))
        ));
    }

    #[test]
    fn duration_millis_clamps_to_max_delay() {
        assert_eq!(duration_millis(Duration::from_secs(2)), 2000);
        let max = MAX_DELAY.as_millis() as i64;
        assert_eq!(duration_millis(MAX_DELAY), max);
        assert_eq!(duration_millis(Duration::from_secs(u64::MAX / 4)), max);
        assert_eq!(duration_millis(Duration::MAX), max);
    }
}
