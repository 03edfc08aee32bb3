//! Weakly-associated value list storage.
//!
//! Native callbacks that outlive a single script invocation (a scheduled
//! timer's callback plus its captured arguments, a web request's
//! completion callback) must reference script values without holding a
//! strong reference back to the engine - that cycle would keep the
//! engine alive forever. The store holds the only strong handles, the
//! engine holds the store, and the callback carries just a [`JsWeakValuesId`]
//! token, which is `Copy` and safe to move across threads.

use std::collections::HashMap;

use crate::error::WeakValuesError;
use v8;

/// Opaque token referencing one stored list of values.
///
/// Valid until [`take`](crate::JsEngine::take_js_values) succeeds on it
/// exactly once or the owning engine is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JsWeakValuesId(pub(crate) u64);

/// The list collection behind the engine's weak value mutex.
pub(crate) struct WeakValueLists {
    next_id: u64,
    lists: HashMap<u64, Vec<v8::Global<v8::Value>>>,
    closed: bool,
}

// SAFETY: The lists hold `v8::Global` handles, which are not automatically
// `Send`/`Sync` because of their backing `NonNull`. They are only ever
// dereferenced on the isolate's thread (every script-touching path enters
// the isolate under `&mut JsEngine` first); the store merely owns, moves,
// and drops the handles, which is sound from any thread. This is what makes
// the surrounding `EngineState` and the public `WeakValuesHandle` the
// `Send + Sync` that their contract documents.
unsafe impl Send for WeakValueLists {}
unsafe impl Sync for WeakValueLists {}

impl WeakValueLists {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            lists: HashMap::new(),
            closed: false,
        }
    }

    pub(crate) fn store(
        &mut self,
        values: Vec<v8::Global<v8::Value>>,
    ) -> Result<JsWeakValuesId, WeakValuesError> {
        if self.closed {
            return Err(WeakValuesError::Closed);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.lists.insert(id, values);
        Ok(JsWeakValuesId(id))
    }

    pub(crate) fn take(
        &mut self,
        id: JsWeakValuesId,
    ) -> Result<Vec<v8::Global<v8::Value>>, WeakValuesError> {
        if self.closed {
            return Err(WeakValuesError::Closed);
        }
        self.lists.remove(&id.0).ok_or(WeakValuesError::Stale)
    }

    /// Drain every list and reject all further operations.
    ///
    /// Called during engine teardown, before the isolate is disposed:
    /// the caller drops the returned handles while dropping them is
    /// still legal, and in-flight `take` calls from worker threads
    /// observe `Closed` instead of a dangling list.
    pub(crate) fn close(&mut self) -> Vec<Vec<v8::Global<v8::Value>>> {
        self.closed = true;
        self.lists.drain().map(|(_, values)| values).collect()
    }
}
