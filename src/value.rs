//! Script value handles and native literal conversion.

use v8;

/// A handle to a script-visible datum (primitive, object, function, ...).
///
/// The handle is strong: the referenced script object stays alive as
/// long as the handle exists. Inspection and manipulation go through
/// [`crate::JsEngine`] methods, which enter the context first.
///
/// A `JsValue` must not outlive the engine that created it. Values that
/// need to survive inside a native callback should be placed in the
/// engine's weak value store instead, which is drained on engine
/// teardown (see [`crate::JsEngine::store_js_values`]).
pub struct JsValue {
    pub(crate) inner: v8::Global<v8::Value>,
}

// SAFETY: A `JsValue` wraps a `v8::Global`, whose backing `NonNull` makes
// it neither `Send` nor `Sync` automatically. The engine's API only ever
// touches the referenced script object while holding `&mut JsEngine`, which
// enters the isolate's single thread first, so the handle itself may be
// moved and shared across threads (the event registry and weak value store
// both require this). The `Global` keeps the isolate alive via its embedded
// `IsolateHandle`.
unsafe impl Send for JsValue {}
unsafe impl Sync for JsValue {}

impl JsValue {
    pub(crate) fn from_global(inner: v8::Global<v8::Value>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_global(self) -> v8::Global<v8::Value> {
        self.inner
    }
}

impl std::fmt::Debug for JsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsValue")
    }
}

/// A native literal convertible into a script value.
///
/// Used by [`crate::JsEngine::new_value`] so the one entry point covers
/// strings, integers, floats and booleans.
#[derive(Debug, Clone, PartialEq)]
pub enum JsLiteral {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for JsLiteral {
    fn from(value: bool) -> Self {
        JsLiteral::Bool(value)
    }
}

impl From<i32> for JsLiteral {
    fn from(value: i32) -> Self {
        JsLiteral::Int(value as i64)
    }
}

impl From<i64> for JsLiteral {
    fn from(value: i64) -> Self {
        JsLiteral::Int(value)
    }
}

impl From<f64> for JsLiteral {
    fn from(value: f64) -> Self {
        JsLiteral::Float(value)
    }
}

impl From<&str> for JsLiteral {
    fn from(value: &str) -> Self {
        JsLiteral::Str(value.to_string())
    }
}

impl From<String> for JsLiteral {
    fn from(value: String) -> Self {
        JsLiteral::Str(value)
    }
}

impl From<()> for JsLiteral {
    fn from(_: ()) -> Self {
        JsLiteral::Null
    }
}

/// Materialize a literal as a local handle in the given scope.
pub(crate) fn literal_to_local<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    literal: &JsLiteral,
) -> v8::Local<'s, v8::Value> {
    match literal {
        JsLiteral::Null => v8::null(scope).into(),
        JsLiteral::Bool(b) => v8::Boolean::new(scope, *b).into(),
        JsLiteral::Int(i) => v8::Number::new(scope, *i as f64).into(),
        JsLiteral::Float(f) => v8::Number::new(scope, *f).into(),
        JsLiteral::Str(s) => match v8::String::new(scope, s) {
            Some(local) => local.into(),
            // Over-long strings degrade to null rather than aborting.
            None => v8::null(scope).into(),
        },
    }
}
