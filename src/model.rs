//! Core data model.
//!
//! A queue item is one unit of work waiting for, held by, or finished by a
//! worker. It carries a caller-defined type, an opaque payload, retry
//! bookkeeping, and the lease (worker id + visibility deadline) that fences
//! concurrent workers from each other.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Newtype for queue item IDs. Supplied by the producer and globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ItemId)
            .map_err(|e| Error::InvalidArgument(format!("item id {s:?}: {e}")))
    }
}

/// Opaque lease holder identity. Compared on every `complete`/`fail`, so it
/// acts as the fencing token: two workers must never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh identity: process id plus a random suffix.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("worker-{}-{}", std::process::id(), &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for a worker once `visible_at` passes.
    Pending,
    /// Leased to `worker_id` until `visible_at`.
    Processing,
    /// Done. Terminal.
    Completed,
    /// Retries exhausted. Terminal.
    Dead,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Processing,
        Status::Completed,
        Status::Dead,
    ];

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Processing) // expired lease reclaimed
                | (Processing, Completed)
                | (Processing, Pending)    // failed, retries left
                | (Processing, Dead) // failed, retries exhausted
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Dead)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Dead => "dead",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "dead" => Ok(Status::Dead),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue Item
// ---------------------------------------------------------------------------

/// A queue item as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,

    /// Caller-defined discriminator selecting the handler.
    pub item_type: String,

    /// Handler-specific document. The engine never looks inside.
    pub payload: serde_json::Value,

    pub status: Status,

    /// Number of claims so far. Bumped at claim time, so a crash after
    /// claiming still counts as an attempt.
    pub retry_count: u32,

    /// Fixed at enqueue time.
    pub max_retries: u32,

    /// Lease length granted on each claim.
    pub visibility_timeout_secs: u32,

    /// Not claimable before this instant. While processing, this is the
    /// lease expiry.
    pub visible_at: DateTime<Utc>,

    /// Current lease holder; only set while processing.
    pub worker_id: Option<WorkerId>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// The claim predicate, evaluated against `now`.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, Status::Pending | Status::Processing)
            && self.visible_at <= now
            && self.retry_count <= self.max_retries
    }

    /// A failure on the current attempt would dead-letter the item.
    pub fn is_final_attempt(&self) -> bool {
        self.retry_count > self.max_retries
    }

    /// Lease expiry, if currently leased.
    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        (self.status == Status::Processing).then_some(self.visible_at)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// When a newly enqueued item first becomes claimable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleAt {
    /// Immediately (server time).
    Now,
    /// Server time plus a delay.
    After(Duration),
    /// An absolute instant chosen by the producer.
    At(DateTime<Utc>),
}

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u32 = 30;

/// Builder for creating new queue items. The public API for enqueueing.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub(crate) id: ItemId,
    pub(crate) item_type: String,
    pub(crate) payload: serde_json::Value,
    pub(crate) max_retries: u32,
    pub(crate) visibility_timeout_secs: u32,
    pub(crate) visible_at: VisibleAt,
}

impl NewItem {
    pub fn new(id: ItemId, item_type: impl Into<String>) -> Self {
        Self {
            id,
            item_type: item_type.into(),
            payload: serde_json::json!({}),
            max_retries: DEFAULT_MAX_RETRIES,
            visibility_timeout_secs: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            visible_at: VisibleAt::Now,
        }
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn visibility_timeout_secs(mut self, secs: u32) -> Self {
        self.visibility_timeout_secs = secs;
        self
    }

    pub fn visible_at(mut self, at: VisibleAt) -> Self {
        self.visible_at = at;
        self
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.visible_at(VisibleAt::After(delay))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.item_type.is_empty() {
            return Err(Error::InvalidArgument("item type must not be empty".into()));
        }
        if self.visibility_timeout_secs == 0 {
            return Err(Error::InvalidArgument(
                "visibility_timeout_secs must be positive".into(),
            ));
        }
        if self.max_retries > i32::MAX as u32 || self.visibility_timeout_secs > i32::MAX as u32 {
            return Err(Error::InvalidArgument("value out of range".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Item counts per status for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub dead: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.dead
    }

    pub(crate) fn add(&mut self, status: Status, n: u64) {
        match status {
            Status::Pending => self.pending += n,
            Status::Processing => self.processing += n,
            Status::Completed => self.completed += n,
            Status::Dead => self.dead += n,
        }
    }
}
