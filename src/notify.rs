use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Process-wide "credentials were rejected" broadcast.
///
/// Handlers run synchronously inside [`UnauthorizedChannel::publish`]. Clones
/// share one registry.
#[derive(Clone, Default)]
pub struct UnauthorizedChannel {
    inner: Arc<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler>>,
}

impl UnauthorizedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.inner.handlers.lock() {
            guard.insert(id, Arc::new(handler));
        }
        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Notifies every current subscriber and returns how many ran.
    pub fn publish(&self) -> usize {
        // Copy out so a handler may subscribe or unsubscribe without deadlocking.
        let handlers: Vec<Handler> = match self.inner.handlers.lock() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => return 0,
        };
        debug!(subscribers = handlers.len(), "publishing unauthorized notification");
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .map(|guard| guard.len())
            .unwrap_or(0)
    }
}

/// Registration handle; dropping it removes the handler.
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade()
            && let Ok(mut guard) = registry.handlers.lock()
        {
            guard.remove(&self.id);
        }
    }
}
