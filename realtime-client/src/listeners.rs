use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Emitted after a connection is established and the subscription intent is sent.
pub const CONNECTED: &str = "connected";
/// Emitted when an established connection ends. Live updates are paused
/// until the next `connected`; consumers should re-fetch state then.
pub const DISCONNECTED: &str = "disconnected";
/// Emitted with a description of a failed connection attempt or transport error.
pub const ERROR: &str = "error";
/// Emitted with every well-formed inbound frame.
pub const MESSAGE: &str = "message";

pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`Listeners::on`], used to unregister the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Local publish/subscribe keyed by event name.
///
/// Callbacks for a key run synchronously, one after another, in the order they
/// were registered. A slow callback delays every callback registered after it
/// for the same event; there is no queuing.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    by_key: Mutex<HashMap<String, Vec<(ListenerId, Callback)>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, key: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered under `key`.
    pub fn off(&self, key: &str, id: ListenerId) -> bool {
        let mut by_key = self.lock();
        let Some(callbacks) = by_key.get_mut(key) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            by_key.remove(key);
        }
        removed
    }

    /// Invoke every callback registered under `key`. Returns how many ran.
    ///
    /// The callback list is copied before invoking anything, so callbacks may
    /// register or unregister listeners without deadlocking.
    pub fn emit(&self, key: &str, value: &Value) -> usize {
        let callbacks: Vec<Callback> = match self.lock().get(key) {
            Some(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return 0,
        };
        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    pub fn count(&self, key: &str) -> usize {
        self.lock().get(key).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(ListenerId, Callback)>>> {
        self.by_key.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
