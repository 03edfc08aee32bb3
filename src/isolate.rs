//! Scope-based isolate ownership.

use crate::platform;
use v8;

/// Owns a V8 isolate: acquires it on construction, disposes it on drop.
///
/// Deliberately neither `Clone` nor `Copy` - an isolate has exactly one
/// owner. [`crate::JsEngine`] declares this as its last field so that
/// every handle referencing the isolate (context, stored values) is
/// destroyed before the isolate itself; dropping them afterwards would
/// touch freed engine memory.
pub(crate) struct ScopedIsolate {
    isolate: v8::OwnedIsolate,
}

impl ScopedIsolate {
    pub(crate) fn new() -> Self {
        platform::ensure_initialized();
        Self {
            isolate: v8::Isolate::new(Default::default()),
        }
    }

    pub(crate) fn get(&mut self) -> &mut v8::Isolate {
        &mut self.isolate
    }
}
