//! Blocking-dequeue coordination.
//!
//! One `tokio::sync::Notify` per entity type. Wakes are broadcast: every
//! armed waiter is woken and re-checks eligibility itself, losing the race
//! gracefully if another consumer got there first. To avoid a lost wakeup,
//! callers must arm the notified future *before* checking for work:
//!
//! ```ignore
//! let notify = coordinator.handle("Task").await;
//! loop {
//!     let notified = notify.notified();
//!     tokio::pin!(notified);
//!     notified.as_mut().enable();
//!     if let Some(item) = try_claim().await? {
//!         return Ok(item);
//!     }
//!     notified.await;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Hands out per-entity-type wake channels and fans notifications out to
/// them. No fairness guarantee among woken consumers.
#[derive(Default)]
pub struct WaitCoordinator {
    channels: Mutex<HashMap<String, Arc<Notify>>>,
}

impl WaitCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wake channel for one entity type, created on first use. Holding
    /// the `Arc` keeps the channel alive across the whole wait loop.
    pub async fn handle(&self, entity_type: &str) -> Arc<Notify> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(entity_type.to_string())
            .or_default()
            .clone()
    }

    /// Wake every consumer currently waiting on this entity type. Called
    /// after any insert or release affecting the type; a type nobody has
    /// ever waited on is a no-op.
    pub async fn notify(&self, entity_type: &str) {
        let channels = self.channels.lock().await;
        if let Some(notify) = channels.get(entity_type) {
            notify.notify_waiters();
        }
    }
}
