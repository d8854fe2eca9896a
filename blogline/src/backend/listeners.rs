use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
};

use super::AuthEvent;
use crate::models::Session;

/// Callback invoked with every session change.
pub type SessionListener = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, SessionListener)>>,
}

/// Listener registry shared by the backend adapters.
#[derive(Default, Clone)]
pub struct SessionListeners {
    inner: Arc<ListenerSet>,
}

impl SessionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: SessionListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        Subscription {
            id,
            set: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every listener in subscription order.
    pub fn notify(&self, event: AuthEvent, session: Option<&Session>) {
        // Snapshot first so listeners may subscribe or unsubscribe while being called.
        let listeners: Vec<SessionListener> = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        log::debug!("auth event {event} delivered to {} listener(s)", listeners.len());
        for listener in listeners {
            listener(event, session);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    set: Weak<ListenerSet>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
