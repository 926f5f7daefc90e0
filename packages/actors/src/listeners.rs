//! Listener registration for queue and operation events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dropq_core::QueueEvent;
use parking_lot::RwLock;

/// Receives committed queue and operation events.
///
/// Called from the notifier actor, never from the thread that made the
/// change. Implementations should return quickly.
pub trait QueueListener: Send + Sync + 'static {
    fn on_event(&self, event: &QueueEvent);
}

impl<F> QueueListener for F
where
    F: Fn(&QueueEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &QueueEvent) {
        self(event)
    }
}

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners, shared between the notifier and callers.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn QueueListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: impl QueueListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        tracing::debug!(listener = id.0, "Listener registered");
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        before != listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke every listener. The lock is not held during callbacks, so a
    /// listener may register or unregister others.
    pub fn dispatch(&self, event: &QueueEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(event);
        }
    }
}
