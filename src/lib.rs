//! # workq
//!
//! Durable, table-backed work queue on Postgres with at-least-once delivery.
//!
//! Workers lease items with a lock-skipping claim, so any number of them can
//! poll the same queue without contention. A lease that expires without an
//! ack makes the item claimable again; that is the only crash-recovery
//! mechanism. Acks are fenced on the worker id, so a worker that lost its
//! lease cannot complete or fail an item it no longer owns. Items that
//! exhaust their retries are dead-lettered, never deleted.
//!
//! Handlers must tolerate redelivery: the engine does not deduplicate side
//! effects.
//!
//! ```no_run
//! # async fn demo() -> workq::error::Result<()> {
//! use workq::db::{Db, QueueName};
//! use workq::model::{ItemId, NewItem, WorkerId};
//!
//! let db = Db::connect("postgres://localhost/workq").await?;
//! db.migrate().await?;
//! let tasks = db.queue(QueueName::task());
//!
//! tasks.enqueue(NewItem::new(ItemId::new(), "sync_account").max_retries(2)).await?;
//!
//! let me = WorkerId::generate();
//! if let Some(item) = tasks.claim_next(&me).await? {
//!     if tasks.complete(item.id, &me).await? == 0 {
//!         // lease expired and another worker owns the item now
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod runner;
pub mod telemetry;
