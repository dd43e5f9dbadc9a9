//! Callback subscriptions for finalized proposals.
//!
//! Subscribers register a callback and get back a [`Subscription`] handle.
//! Every finalization calls each subscriber registered at that moment
//! exactly once. Callbacks run outside the subscriber lock, so a callback
//! may itself subscribe or unsubscribe.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::ProposalId;

type Callback = Arc<dyn Fn(&ProposalId) + Send + Sync>;

/// Registry of finalization callbacks.
#[derive(Default)]
pub struct NotificationBus {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Callback>>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&ProposalId) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(callback));
        debug!(subscription = id, "Subscriber added");
        Subscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Call every current subscriber once. Returns how many were called.
    ///
    /// Subscribers are snapshotted up front, and each one is checked again
    /// just before its call, so a subscriber removed earlier in the same
    /// round is skipped. A callback already running when `unsubscribe`
    /// returns still completes. A panicking callback is logged and does not
    /// stop delivery to the rest.
    pub fn notify(&self, proposal_id: &ProposalId) -> usize {
        let ids: Vec<u64> = self.lock().keys().copied().collect();

        let mut delivered = 0;
        for id in ids {
            let Some(callback) = self.lock().get(&id).map(Arc::clone) else {
                continue;
            };
            if catch_unwind(AssertUnwindSafe(|| callback(proposal_id))).is_err() {
                warn!(subscription = id, proposal = %proposal_id, "Subscriber callback panicked");
            }
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Callback>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for removing a callback.
///
/// Dropping the handle leaves the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<NotificationBus>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => {
                let removed = bus.remove(self.id);
                debug!(subscription = self.id, removed, "Subscriber removed");
                removed
            }
            None => false,
        }
    }
}
