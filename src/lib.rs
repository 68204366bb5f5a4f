//! # durq
//!
//! Durable, lease-based work queue over an embedded record store.
//!
//! Producers insert typed work items; consumers block on [`queue::WorkQueue::dequeue`]
//! until an item is available, then hold a process-local lease on it until they
//! acknowledge completion with [`queue::WorkQueue::release`], which removes the
//! item from storage for good. No two consumers ever hold the same item at once.
//!
//! Storage is abstract ([`store::Store`]); [`store::sqlite::SqliteStore`] is the
//! shipped SQLite-backed implementation. Leases live only in process memory, so
//! a restart makes unreleased items available again.

pub mod error;
pub mod lease;
pub mod model;
pub mod queue;
pub mod store;
pub mod wait;

pub use error::{Error, Result};
pub use model::{EntityDef, Identity, Properties, WorkItem};
pub use queue::WorkQueue;
pub use store::Store;
