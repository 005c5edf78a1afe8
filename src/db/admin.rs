//! Queue table administration: create and drop.
//!
//! Calls the SQL functions installed by the migrations:
//! `workq_create_queue` and `workq_drop_queue`.

use crate::error::{Error, Result};
use tracing::info;

/// Validated queue name. The only value ever spliced into SQL text, so the
/// character set is restricted to `[a-z][a-z0-9_]{0,47}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    pub const TASK: &'static str = "task";
    pub const EVENT: &'static str = "event";

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = name.len() <= 48
            && chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(name))
        } else {
            Err(Error::InvalidQueueName(name))
        }
    }

    /// The generic task queue.
    pub fn task() -> Self {
        Self(Self::TASK.to_string())
    }

    /// The domain-event queue.
    pub fn event() -> Self {
        Self(Self::EVENT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backing table name.
    pub fn table(&self) -> String {
        format!("workq_{}", self.0)
    }

    /// LISTEN/NOTIFY channel signalled on enqueue.
    pub fn channel(&self) -> String {
        format!("workq_{}", self.0)
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for QueueName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl super::Db {
    /// Create a queue table (idempotent).
    pub async fn create_queue(&self, name: &QueueName) -> Result<()> {
        sqlx::query("SELECT workq_create_queue($1)")
            .bind(name.as_str())
            .execute(self.pool())
            .await?;
        info!(queue = %name, "queue ready");
        Ok(())
    }

    /// Drop a queue table and every item in it.
    pub async fn drop_queue(&self, name: &QueueName) -> Result<()> {
        sqlx::query("SELECT workq_drop_queue($1)")
            .bind(name.as_str())
            .execute(self.pool())
            .await?;
        info!(queue = %name, "queue dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_identifiers() {
        for name in ["task", "event", "q1", "sync_accounts", "a"] {
            assert!(QueueName::new(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_names_unsafe_for_sql() {
        for name in [
            "",
            "Task",
            "1queue",
            "_queue",
            "q-1",
            "q; DROP TABLE x",
            "q\"x",
            "élan",
        ] {
            assert!(
                matches!(QueueName::new(name), Err(Error::InvalidQueueName(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_names_over_48_chars() {
        assert!(QueueName::new("a".repeat(48)).is_ok());
        assert!(QueueName::new("a".repeat(49)).is_err());
    }

    #[test]
    fn table_and_channel_are_prefixed() {
        let name = QueueName::event();
        assert_eq!(name.table(), "workq_event");
        assert_eq!(name.channel(), "workq_event");
        assert_eq!(QueueName::task().as_str(), "task");
    }
}
