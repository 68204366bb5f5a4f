//! The work queue façade: enqueue, blocking dequeue, release.
//!
//! Composes a [`Store`] with the in-memory [`LeaseTable`] and
//! [`WaitCoordinator`]. One queue per store, injected explicitly; hosts that
//! want a shared instance wrap it in an `Arc` themselves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lease::LeaseTable;
use crate::model::{Identity, Properties, WorkItem};
use crate::store::Store;
use crate::wait::WaitCoordinator;

pub struct WorkQueue {
    store: Arc<dyn Store>,
    leases: LeaseTable,
    waiters: WaitCoordinator,
    /// Per-entity-type claim locks. Query-then-lease must be a critical
    /// section or two consumers could lease the same identity. Entries live
    /// for the queue's lifetime, one per distinct entity type ever dequeued;
    /// consumers may hold the `Arc` across a wait, so they are never pruned.
    claims: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkQueue {
    /// Bind a queue to one store instance.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            leases: LeaseTable::new(),
            waiters: WaitCoordinator::new(),
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Persist a new work item and wake consumers waiting on its type.
    ///
    /// Surfaces `UnknownEntityType` / `UnknownField` from the store's
    /// validation; nothing is enqueued in that case.
    pub async fn enqueue(&self, entity_type: &str, properties: Properties) -> Result<()> {
        self.enqueue_returning(entity_type, properties).await?;
        Ok(())
    }

    /// `enqueue`, returning the store-assigned identity.
    pub async fn enqueue_returning(
        &self,
        entity_type: &str,
        properties: Properties,
    ) -> Result<Identity> {
        let item = self.store.insert(entity_type, properties).await?;
        debug!(identity = %item.identity, entity_type, "enqueued");
        self.waiters.notify(entity_type).await;
        Ok(item.identity)
    }

    /// Block until an item of this type is available, lease it, return it.
    /// The item stays in the store until [`release`](Self::release).
    pub async fn dequeue(&self, entity_type: &str) -> Result<WorkItem> {
        let mut items = self.dequeue_inner(entity_type, 1, None).await?;
        items
            .pop()
            .ok_or_else(|| Error::Other("dequeue woke without an item".to_string()))
    }

    /// Like [`dequeue`](Self::dequeue), giving up after `timeout`. `None`
    /// means no item became available in time; that is a normal outcome,
    /// not a failure.
    pub async fn dequeue_timeout(
        &self,
        entity_type: &str,
        timeout: Duration,
    ) -> Result<Option<WorkItem>> {
        let deadline = Instant::now() + timeout;
        let mut items = self.dequeue_inner(entity_type, 1, Some(deadline)).await?;
        Ok(items.pop())
    }

    /// Block until at least one item is available, then lease up to `count`
    /// in store order. Returns however many were actually leased, which may
    /// be fewer than requested; never waits for the full count.
    pub async fn dequeue_many(&self, entity_type: &str, count: usize) -> Result<Vec<WorkItem>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.dequeue_inner(entity_type, count, None).await
    }

    /// Like [`dequeue_many`](Self::dequeue_many) with a deadline for the
    /// first item. `None` on timeout.
    pub async fn dequeue_many_timeout(
        &self,
        entity_type: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Option<Vec<WorkItem>>> {
        if count == 0 {
            return Ok(Some(Vec::new()));
        }
        let deadline = Instant::now() + timeout;
        let items = self.dequeue_inner(entity_type, count, Some(deadline)).await?;
        Ok(if items.is_empty() { None } else { Some(items) })
    }

    /// Acknowledge completion: permanently delete the item and clear its
    /// lease.
    ///
    /// Delete runs first so the identity is never visible to a query while
    /// unleased; if the delete fails the lease stays put and the caller may
    /// retry.
    pub async fn release(&self, item: &WorkItem) -> Result<()> {
        self.store.delete(item.identity).await?;
        self.leases.release(&item.entity_type, item.identity).await;
        debug!(identity = %item.identity, entity_type = %item.entity_type, "released");
        self.waiters.notify(&item.entity_type).await;
        Ok(())
    }

    /// The wait loop. Arms the wake future before each claim attempt so a
    /// notification landing between the attempt and the await is never lost.
    /// With no deadline, only returns a non-empty batch; with a deadline, an
    /// empty batch means it elapsed.
    async fn dequeue_inner(
        &self,
        entity_type: &str,
        count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<WorkItem>> {
        let notify = self.waiters.handle(entity_type).await;
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let claimed = self.try_claim(entity_type, count).await?;
            if !claimed.is_empty() {
                return Ok(claimed);
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(Vec::new());
                    }
                }
            }
        }
    }

    /// One claim attempt: under the per-type lock, query the store excluding
    /// leased identities and lease whatever came back. Leasing happens in a
    /// single lease-table lock scope after the query, so cancelling a caller
    /// mid-dequeue never leaks a partial batch.
    async fn try_claim(&self, entity_type: &str, count: usize) -> Result<Vec<WorkItem>> {
        let lock = self.claim_lock(entity_type).await;
        let _guard = lock.lock().await;

        let excluding = self.leases.snapshot(entity_type).await;
        let items = self
            .store
            .query_available(entity_type, &excluding, count)
            .await?;
        if items.is_empty() {
            return Ok(items);
        }

        let identities: Vec<Identity> = items.iter().map(|item| item.identity).collect();
        if let Err(e) = self.leases.mark_many(entity_type, &identities).await {
            // Can't happen while the claim lock is held; treat as an
            // invariant violation and abort this call with the table intact.
            warn!(entity_type, "lease conflict during claim: {e}");
            return Err(e);
        }

        debug!(entity_type, claimed = items.len(), "leased");
        Ok(items)
    }

    async fn claim_lock(&self, entity_type: &str) -> Arc<Mutex<()>> {
        let mut claims = self.claims.lock().await;
        claims.entry(entity_type.to_string()).or_default().clone()
    }
}
