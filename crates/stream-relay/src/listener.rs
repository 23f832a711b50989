//! Listener registry: named channels fanned out to ordered callbacks.
//!
//! Each relay owns one registry. Publishing is synchronous: every listener
//! registered on the channel runs to completion, in registration order,
//! before `publish` returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default channel values are published on.
pub const VALUE_CHANNEL: &str = "value";
/// Fixed channel carrying the (at most one) source or transform failure.
pub const ERROR_CHANNEL: &str = "error";
/// Fixed channel carrying the terminal completion signal.
pub const END_CHANNEL: &str = "end";

/// A signal published by a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<U, E> {
    /// A (possibly transformed) value pulled from the source.
    Value(U),
    /// The failure that stopped the drain task.
    Error(E),
    /// Terminal signal, published exactly once.
    End,
}

impl<U, E> Event<U, E> {
    pub const fn as_value(&self) -> Option<&U> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_error(&self) -> Option<&E> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// Identifies a registered listener so it can be removed with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared callback invoked for every event published on its channel.
pub type Listener<U, E> = Arc<dyn Fn(&Event<U, E>) + Send + Sync>;

struct Entry<U, E> {
    id: ListenerId,
    once: bool,
    listener: Listener<U, E>,
}

/// Channel name → ordered listeners.
pub struct ListenerRegistry<U, E> {
    channels: Mutex<HashMap<String, Vec<Entry<U, E>>>>,
    next_id: AtomicU64,
}

impl<U, E> Default for ListenerRegistry<U, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U, E> ListenerRegistry<U, E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a listener to `channel`.
    pub fn on<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event<U, E>) + Send + Sync + 'static,
    {
        self.register(channel, Arc::new(listener), false)
    }

    /// Append a listener that is removed before its first invocation.
    pub fn once<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event<U, E>) + Send + Sync + 'static,
    {
        self.register(channel, Arc::new(listener), true)
    }

    /// Remove a listener. Returns `false` if it was not registered
    /// (already removed, or a `once` listener that already fired).
    pub fn off(&self, id: ListenerId) -> bool {
        let mut channels = self.channels();
        let mut removed = false;
        for entries in channels.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            removed |= entries.len() != before;
        }
        channels.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Number of listeners currently registered on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels().get(channel).map_or(0, Vec::len)
    }

    /// Invoke every listener on `channel` with `event`.
    ///
    /// The listener list is snapshotted first, so listeners may register or
    /// remove listeners without affecting the current publish. Returns the
    /// number of listeners invoked.
    pub fn publish(&self, channel: &str, event: &Event<U, E>) -> usize {
        let snapshot: Vec<Listener<U, E>> = {
            let mut channels = self.channels();
            let Some(entries) = channels.get_mut(channel) else {
                return 0;
            };
            let snapshot = entries.iter().map(|e| Arc::clone(&e.listener)).collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                channels.remove(channel);
            }
            snapshot
        };

        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    fn register(&self, channel: &str, listener: Listener<U, E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.channels()
            .entry(channel.to_string())
            .or_default()
            .push(Entry { id, once, listener });
        id
    }

    // Listeners never run under the lock, so a poisoned map is still consistent.
    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<Entry<U, E>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<U, E> std::fmt::Debug for ListenerRegistry<U, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .channels()
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("channels", &counts)
            .finish()
    }
}
