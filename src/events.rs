//! Event registry: a thread-safe map from event name to native callback.
//!
//! This is a general-purpose pub/sub seam between native code and the
//! embedding host. Event names are free-form strings, not a closed set,
//! so the registry performs no validation on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::value::JsValue;

/// Callback invoked when its event is triggered.
pub type EventCallback = Arc<dyn Fn(Vec<JsValue>) + Send + Sync>;

pub(crate) struct EventRegistry {
    callbacks: Mutex<HashMap<String, EventCallback>>,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` for `name`, replacing any existing callback.
    pub(crate) fn set(&self, name: &str, callback: EventCallback) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.insert(name.to_string(), callback);
    }

    /// Remove the callback for `name`. No-op if absent.
    pub(crate) fn remove(&self, name: &str) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.remove(name);
    }

    /// Invoke the callback registered for `name` with `params`, or do
    /// nothing if no callback is registered.
    ///
    /// The lock only guards the map lookup; the callback runs after it
    /// is released, so a callback may re-enter the registry without
    /// deadlocking.
    pub(crate) fn trigger(&self, name: &str, params: Vec<JsValue>) {
        let callback = {
            let callbacks = self.callbacks.lock().unwrap();
            callbacks.get(name).cloned()
        };
        if let Some(callback) = callback {
            callback(params);
        }
    }

    /// Drop every registered callback. Part of engine teardown: a
    /// callback may have captured script handles, which must die before
    /// the isolate does.
    pub(crate) fn clear(&self) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn trigger_invokes_registered_callback() {
        let registry = EventRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        registry.set(
            "ping",
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.trigger("ping", Vec::new());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_unregistered_is_noop() {
        let registry = EventRegistry::new();
        registry.trigger("nobody-home", Vec::new());
    }

    #[test]
    fn set_replaces_previous_callback() {
        let registry = EventRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first2 = first.clone();
        registry.set(
            "evt",
            Arc::new(move |_| {
                first2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let second2 = second.clone();
        registry.set(
            "evt",
            Arc::new(move |_| {
                second2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.trigger("evt", Vec::new());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_then_trigger_is_noop() {
        let registry = EventRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        registry.set(
            "evt",
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        registry.remove("evt");
        registry.remove("evt"); // removing twice is fine
        registry.trigger("evt", Vec::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_reenter_registry() {
        let registry = Arc::new(EventRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let registry2 = registry.clone();
        let hits2 = hits.clone();
        registry.set(
            "outer",
            Arc::new(move |_| {
                // Mutating the registry from inside a callback must not
                // deadlock: the map lock is released before invocation.
                registry2.remove("outer");
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.trigger("outer", Vec::new());
        registry.trigger("outer", Vec::new());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
