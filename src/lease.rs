//! In-memory lease bookkeeping.
//!
//! A lease marks a persisted identity as checked out to a consumer. The store
//! never sees leases; they exist only here, scoped per entity type, and are
//! gone after a process restart.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::Identity;

/// Tracks which identities are currently checked out. At most one
/// outstanding lease per identity; leased identities are excluded from
/// dequeue until released.
#[derive(Default)]
pub struct LeaseTable {
    inner: Mutex<HashMap<String, HashSet<Identity>>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease one identity. Fails with `AlreadyLeased` if it is already out.
    pub async fn mark_leased(&self, entity_type: &str, identity: Identity) -> Result<()> {
        let mut map = self.inner.lock().await;
        mark_on(&mut map, entity_type, identity)
    }

    /// Lease a batch under one lock acquisition: either every identity is
    /// marked or none are. A duplicate anywhere in the batch leaves the
    /// table untouched.
    pub async fn mark_many(&self, entity_type: &str, identities: &[Identity]) -> Result<()> {
        let mut map = self.inner.lock().await;
        for (idx, &identity) in identities.iter().enumerate() {
            if let Err(e) = mark_on(&mut map, entity_type, identity) {
                // Unwind the ones taken so far.
                if let Some(set) = map.get_mut(entity_type) {
                    for &taken in &identities[..idx] {
                        set.remove(&taken);
                    }
                    if set.is_empty() {
                        map.remove(entity_type);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn is_leased(&self, entity_type: &str, identity: Identity) -> bool {
        let map = self.inner.lock().await;
        map.get(entity_type).is_some_and(|set| set.contains(&identity))
    }

    /// Idempotent removal. Returns whether a lease was actually held.
    /// Drops the per-type entry once its last lease is gone so the map
    /// doesn't accrete empty sets over the queue's lifetime.
    pub async fn release(&self, entity_type: &str, identity: Identity) -> bool {
        let mut map = self.inner.lock().await;
        let Some(set) = map.get_mut(entity_type) else {
            return false;
        };
        let held = set.remove(&identity);
        if set.is_empty() {
            map.remove(entity_type);
        }
        held
    }

    /// Copy of the leased identities for one entity type, for building a
    /// query exclusion set.
    pub async fn snapshot(&self, entity_type: &str) -> HashSet<Identity> {
        let map = self.inner.lock().await;
        map.get(entity_type).cloned().unwrap_or_default()
    }
}

fn mark_on(
    map: &mut HashMap<String, HashSet<Identity>>,
    entity_type: &str,
    identity: Identity,
) -> Result<()> {
    let set = map.entry(entity_type.to_string()).or_default();
    if !set.insert(identity) {
        return Err(Error::AlreadyLeased {
            entity_type: entity_type.to_string(),
            identity,
        });
    }
    Ok(())
}
