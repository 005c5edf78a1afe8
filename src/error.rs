//! Error types for workq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An item with this id is already in the queue. Producers may treat
    /// this as "already enqueued".
    #[error("duplicate item id: {0}")]
    DuplicateId(String),

    #[error("queue item not found: {0}")]
    NotFound(String),

    #[error("invalid queue name {0:?}: expected [a-z][a-z0-9_]{{0,47}}")]
    InvalidQueueName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown item status: {0}")]
    UnknownStatus(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Infrastructure failures that a caller can safely retry. Claim and ack
    /// are idempotent at the row level, so retrying them never double-applies.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
                sqlx::Error::Database(db) => {
                    // serialization_failure, deadlock_detected
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_retryable() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn semantic_errors_are_not_retryable() {
        assert!(!Error::DuplicateId("abc".into()).is_retryable());
        assert!(!Error::NotFound("abc".into()).is_retryable());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn queue_name_error_message_shows_pattern() {
        let msg = Error::InvalidQueueName("Bad-Name".into()).to_string();
        assert!(msg.contains("Bad-Name"));
        assert!(msg.contains("[a-z][a-z0-9_]{0,47}"));
    }
}
