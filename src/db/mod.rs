//! Database connection pool, migrations, and health check.
//!
//! One Postgres pool is shared by every queue handle. Each queue lives in its
//! own table created from the same schema (see `migrations/`).

pub mod admin;
pub mod queue;

pub use admin::QueueName;
pub use queue::Queue;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Default pool size when the caller does not configure one.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Database handle. Owns the connection pool shared across all queues.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size.
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations. Creates the standard `task` and `event`
    /// queues.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Handle to one queue. Does not touch the database; call
    /// [`Db::create_queue`] first if the table may not exist yet.
    pub fn queue(&self, name: QueueName) -> Queue {
        Queue::new(self.pool.clone(), name)
    }

    /// The shared pool, for callers that enqueue inside their own
    /// transactions or inspect tables directly.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
