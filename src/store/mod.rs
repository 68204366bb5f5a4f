//! Durable record storage consumed by the queue.
//!
//! The queue only depends on the [`Store`] trait: insert-with-validation,
//! ordered availability query, and delete-by-identity, each call individually
//! atomic and durable before it returns. [`sqlite::SqliteStore`] is the
//! shipped implementation.

pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{EntityDef, Identity, Properties, WorkItem};

#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the schema for an entity type. `None` if the type is unknown.
    async fn entity_def(&self, entity_type: &str) -> Result<Option<EntityDef>>;

    /// Validate and persist a new work item, assigning its identity.
    /// Durable when this returns.
    async fn insert(&self, entity_type: &str, properties: Properties) -> Result<WorkItem>;

    /// Fetch up to `limit` items of a type in stable insertion order,
    /// skipping `excluding`. Repeated calls with no intervening inserts
    /// return items in the same relative order.
    async fn query_available(
        &self,
        entity_type: &str,
        excluding: &HashSet<Identity>,
        limit: usize,
    ) -> Result<Vec<WorkItem>>;

    /// Permanently delete a record. Durable when this returns; deleting an
    /// absent identity is `Error::NotFound`.
    async fn delete(&self, identity: Identity) -> Result<()>;
}
