//! The engine: isolate + persistent context + shared native state.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Notify, mpsc};
use v8;

use crate::bridge;
use crate::error::{JsError, WeakValuesError};
use crate::events::{EventCallback, EventRegistry};
use crate::file_system::{DefaultFileSystem, FileSystem};
use crate::isolate::ScopedIsolate;
use crate::log_sink::{DefaultLogSink, LogSink};
use crate::scheduler::Scheduler;
use crate::timer::{DefaultTimer, Timer};
use crate::value::{JsLiteral, JsValue, literal_to_local};
use crate::weak_values::{JsWeakValuesId, WeakValueLists};
use crate::web_request::{DefaultWebRequest, HttpResponse, WebRequest};

/// A fired collaborator operation, queued until the engine owner pumps
/// the completion channel and re-enters the context.
pub(crate) enum Completion {
    TimerFired(JsWeakValuesId),
    RequestDone(JsWeakValuesId, Result<HttpResponse, String>),
    FileRead(JsWeakValuesId, Result<Vec<u8>, String>),
    FileWritten(JsWeakValuesId, Result<(), String>),
}

/// Sends a completion message and wakes the engine's pump.
///
/// This is the only thing a collaborator's completion closure holds: if
/// the engine is gone the receiver is gone and `send` is a silent
/// no-op, so a late-firing timer or request cannot touch a destroyed
/// engine.
#[derive(Clone)]
pub(crate) struct CompletionSender {
    tx: mpsc::UnboundedSender<Completion>,
    notify: Arc<Notify>,
}

impl CompletionSender {
    pub(crate) fn send(&self, message: Completion) {
        if self.tx.send(message).is_ok() {
            self.notify.notify_one();
        }
    }
}

/// Native function registered through [`JsEngine::new_callback`].
///
/// Receives the entered scope, the call arguments, and the return-value
/// slot. The owning engine's shared state is recoverable from the scope
/// with the usual context lookup, so the callable itself stays plain.
pub(crate) type SharedNativeFn = Arc<
    dyn for<'s, 'i, 'a, 'r> Fn(
            &mut v8::PinScope<'s, 'i>,
            &[v8::Local<'a, v8::Value>],
            &mut v8::ReturnValue<'r>,
        ) + Send
        + Sync,
>;

pub(crate) struct NativeCallbacks {
    next_id: u64,
    map: HashMap<u64, SharedNativeFn>,
}

impl NativeCallbacks {
    fn new() -> Self {
        Self {
            next_id: 1,
            map: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, callback: SharedNativeFn) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.map.insert(id, callback);
        id
    }

    pub(crate) fn get(&self, id: u64) -> Option<SharedNativeFn> {
        self.map.get(&id).cloned()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

/// State shared between the engine, its native bindings, and worker
/// threads holding a [`WeakValuesHandle`].
///
/// Exactly two regions here are meant for cross-thread use: the weak
/// value lists and the event registry, each behind its own mutex (the
/// native-callback table gets the same treatment since script can
/// reach it re-entrantly). Everything else is plain shared read-only
/// configuration.
pub(crate) struct EngineState {
    pub(crate) self_weak: Weak<EngineState>,
    pub(crate) weak_values: Mutex<WeakValueLists>,
    pub(crate) events: EventRegistry,
    pub(crate) native_callbacks: Mutex<NativeCallbacks>,
    pub(crate) completions: CompletionSender,
    pending_tasks: AtomicUsize,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) web_request: Arc<dyn WebRequest>,
    pub(crate) file_system: Arc<dyn FileSystem>,
    pub(crate) log: Arc<dyn LogSink>,
}

impl EngineState {
    pub(crate) fn store_weak(
        &self,
        values: Vec<v8::Global<v8::Value>>,
    ) -> Result<JsWeakValuesId, WeakValuesError> {
        self.weak_values.lock().unwrap().store(values)
    }

    pub(crate) fn take_weak(
        &self,
        id: JsWeakValuesId,
    ) -> Result<Vec<v8::Global<v8::Value>>, WeakValuesError> {
        self.weak_values.lock().unwrap().take(id)
    }

    pub(crate) fn begin_task(&self) {
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
    }

    fn finish_task(&self) {
        self.pending_tasks.fetch_sub(1, Ordering::SeqCst);
    }

    /// Invalidate everything that may hold script handles and return
    /// the drained weak lists so the caller can drop them while the
    /// isolate is still alive.
    fn close(&self) -> Vec<Vec<v8::Global<v8::Value>>> {
        let drained = self.weak_values.lock().unwrap().close();
        self.events.clear();
        self.native_callbacks.lock().unwrap().clear();
        drained
    }
}

/// Thread-safe handle to an engine's weak value store.
///
/// Cloneable and `Send + Sync`; it does not keep the engine's isolate
/// alive. After the engine is destroyed every operation reports
/// [`WeakValuesError::Closed`].
#[derive(Clone)]
pub struct WeakValuesHandle {
    state: Arc<EngineState>,
}

impl WeakValuesHandle {
    pub fn store(&self, values: Vec<JsValue>) -> Result<JsWeakValuesId, WeakValuesError> {
        self.state
            .store_weak(values.into_iter().map(JsValue::into_global).collect())
    }

    pub fn take(&self, id: JsWeakValuesId) -> Result<Vec<JsValue>, WeakValuesError> {
        Ok(self
            .state
            .take_weak(id)?
            .into_iter()
            .map(JsValue::from_global)
            .collect())
    }
}

/// Builder for a [`JsEngine`], accepting optional collaborator
/// overrides. Every collaborator left unset gets the built-in default.
#[derive(Default)]
pub struct JsEngineBuilder {
    timer: Option<Arc<dyn Timer>>,
    web_request: Option<Arc<dyn WebRequest>>,
    file_system: Option<Arc<dyn FileSystem>>,
    log: Option<Arc<dyn LogSink>>,
    scheduler: Option<Scheduler>,
}

impl JsEngineBuilder {
    pub fn timer(mut self, timer: impl Timer + 'static) -> Self {
        self.timer = Some(Arc::new(timer));
        self
    }

    pub fn web_request(mut self, web_request: impl WebRequest + 'static) -> Self {
        self.web_request = Some(Arc::new(web_request));
        self
    }

    pub fn file_system(mut self, file_system: impl FileSystem + 'static) -> Self {
        self.file_system = Some(Arc::new(file_system));
        self
    }

    pub fn log_sink(mut self, log: impl LogSink + 'static) -> Self {
        self.log = Some(Arc::new(log));
        self
    }

    /// Scheduler used by the default web request and filesystem. Has no
    /// effect on explicitly overridden collaborators.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> JsEngine {
        let (tx, completion_rx) = mpsc::unbounded_channel();
        let notify = Arc::new(Notify::new());
        let completions = CompletionSender {
            tx,
            notify: notify.clone(),
        };

        let scheduler = self.scheduler.unwrap_or_default();
        let state = Arc::new_cyclic(|self_weak| EngineState {
            self_weak: self_weak.clone(),
            weak_values: Mutex::new(WeakValueLists::new()),
            events: EventRegistry::new(),
            native_callbacks: Mutex::new(NativeCallbacks::new()),
            completions,
            pending_tasks: AtomicUsize::new(0),
            timer: self.timer.unwrap_or_else(|| Arc::new(DefaultTimer)),
            web_request: self
                .web_request
                .unwrap_or_else(|| Arc::new(DefaultWebRequest::new(scheduler.clone()))),
            file_system: self
                .file_system
                .unwrap_or_else(|| Arc::new(DefaultFileSystem::new(scheduler.clone()))),
            log: self.log.unwrap_or_else(|| Arc::new(DefaultLogSink)),
        });

        let mut isolate = ScopedIsolate::new();
        let context = {
            let scope = pin!(v8::HandleScope::new(isolate.get()));
            let mut scope = scope.init();
            let context = v8::Context::new(&scope, Default::default());
            let scope = &mut v8::ContextScope::new(&mut scope, context);

            bridge::install(scope, &state);

            v8::Global::new(scope.as_ref(), context)
        };

        JsEngine {
            state,
            completion_rx,
            notify,
            context,
            isolate,
        }
    }
}

/// Extract a [`JsError`] out of a caught exception.
macro_rules! script_error {
    ($tc:expr, $filename:expr) => {{
        let message = $tc
            .exception()
            .and_then(|e| e.to_string(&$tc))
            .map(|s| s.to_rust_string_lossy(&$tc))
            .unwrap_or_else(|| "unknown script error".to_string());
        let line = $tc.message().and_then(|m| m.get_line_number(&$tc));
        JsError::new(message, $filename, line)
    }};
}

/// An embedded JavaScript engine with one isolate and one persistent
/// context.
///
/// Script execution is single-threaded: every script-touching method
/// takes `&mut self`, which is the "context entered on this thread"
/// precondition expressed through ownership. The thread-safe surface
/// (event registry, weak value store) takes `&self` and is usable from
/// collaborator callbacks.
///
/// Teardown order is load-bearing: `drop` first drains the weak value
/// store and clears registered callbacks (their handles die while the
/// isolate is alive), then the remaining fields drop in declaration
/// order - context before isolate, isolate last.
pub struct JsEngine {
    state: Arc<EngineState>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    notify: Arc<Notify>,
    context: v8::Global<v8::Context>,
    /// Must stay the last field. See [`ScopedIsolate`].
    isolate: ScopedIsolate,
}

impl JsEngine {
    /// Create an engine with all default collaborators.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> JsEngineBuilder {
        JsEngineBuilder::default()
    }

    // ---- evaluation ----

    /// Compile and run `source` in the persistent context.
    ///
    /// Returns the expression result. On a compile or runtime error the
    /// returned [`JsError`] carries the message, `filename`, and the
    /// line number when available; the engine stays usable.
    pub fn evaluate(&mut self, source: &str, filename: &str) -> Result<JsValue, JsError> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let Some(code) = v8::String::new(scope, source) else {
            return Err(JsError::new("source too large for engine string", filename, None));
        };

        let result = {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();

            let Some(script) = v8::Script::compile(&tc, code, None) else {
                return Err(script_error!(tc, filename));
            };

            match script.run(&tc) {
                Some(result) => result,
                None => return Err(script_error!(tc, filename)),
            }
        };

        Ok(JsValue::from_global(v8::Global::new(scope.as_ref(), result)))
    }

    /// Invoke a script function with `undefined` as the receiver.
    pub fn call(&mut self, function: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &function.inner);
        let function_local: v8::Local<v8::Function> = match local.try_into() {
            Ok(f) => f,
            Err(_) => return Err(JsError::new("value is not a function", "<call>", None)),
        };

        let arg_locals: Vec<v8::Local<v8::Value>> = args
            .iter()
            .map(|a| v8::Local::new(scope, &a.inner))
            .collect();
        let recv = v8::undefined(scope);

        let result = {
            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();

            match function_local.call(&tc, recv.into(), &arg_locals) {
                Some(result) => result,
                None => return Err(script_error!(tc, "<call>")),
            }
        };

        Ok(JsValue::from_global(v8::Global::new(scope.as_ref(), result)))
    }

    // ---- value construction ----

    /// Create a new script value from a native literal.
    pub fn new_value(&mut self, value: impl Into<JsLiteral>) -> JsValue {
        let literal = value.into();
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = literal_to_local(scope, &literal);
        JsValue::from_global(v8::Global::new(scope.as_ref(), local))
    }

    /// Create a new empty script object.
    pub fn new_object(&mut self) -> JsValue {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let object: v8::Local<v8::Value> = v8::Object::new(scope).into();
        JsValue::from_global(v8::Global::new(scope.as_ref(), object))
    }

    /// Create a script function that invokes a native callback.
    ///
    /// The callback receives the entered scope, the call arguments, and
    /// the return-value slot. It stays registered (and alive) until the
    /// engine is destroyed.
    pub fn new_callback<F>(&mut self, callback: F) -> Result<JsValue, JsError>
    where
        F: for<'s, 'i, 'a, 'r> Fn(
                &mut v8::PinScope<'s, 'i>,
                &[v8::Local<'a, v8::Value>],
                &mut v8::ReturnValue<'r>,
            ) + Send
            + Sync
            + 'static,
    {
        let id = self
            .state
            .native_callbacks
            .lock()
            .unwrap()
            .insert(Arc::new(callback));
        let source = format!("(function (...args) {{ return __nativeCall({id}, ...args); }})");
        self.evaluate(&source, "<native callback>")
    }

    // ---- globals and properties ----

    /// The context's global object.
    pub fn global_object(&mut self) -> JsValue {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let global: v8::Local<v8::Value> = context.global(scope).into();
        JsValue::from_global(v8::Global::new(scope.as_ref(), global))
    }

    /// Install a property on the global object, observable by all
    /// subsequently evaluated source.
    pub fn set_global_property(&mut self, name: &str, value: &JsValue) {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let global = context.global(scope);
        if let Some(key) = v8::String::new(scope, name) {
            let local = v8::Local::new(scope, &value.inner);
            global.set(scope, key.into(), local);
        }
    }

    pub fn set_property(&mut self, object: &JsValue, name: &str, value: &JsValue) {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &object.inner);
        if let Some(object_local) = local.to_object(scope)
            && let Some(key) = v8::String::new(scope, name)
        {
            let value_local = v8::Local::new(scope, &value.inner);
            object_local.set(scope, key.into(), value_local);
        }
    }

    pub fn get_property(&mut self, object: &JsValue, name: &str) -> Option<JsValue> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &object.inner);
        let object_local = local.to_object(scope)?;
        let key = v8::String::new(scope, name)?;
        let value = object_local.get(scope, key.into())?;
        Some(JsValue::from_global(v8::Global::new(scope.as_ref(), value)))
    }

    // ---- value inspection ----

    /// String coercion, mirroring script `String(value)` semantics.
    pub fn as_string(&mut self, value: &JsValue) -> String {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        local.to_rust_string_lossy(scope)
    }

    pub fn as_f64(&mut self, value: &JsValue) -> Option<f64> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        local.number_value(scope)
    }

    pub fn as_i64(&mut self, value: &JsValue) -> Option<i64> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        local.integer_value(scope)
    }

    pub fn as_bool(&mut self, value: &JsValue) -> bool {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        local.boolean_value(scope)
    }

    pub fn is_undefined(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_undefined())
    }

    pub fn is_null(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_null())
    }

    pub fn is_function(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_function())
    }

    pub fn is_object(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_object())
    }

    pub fn is_string(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_string())
    }

    pub fn is_number(&mut self, value: &JsValue) -> bool {
        self.check(value, |v| v.is_number())
    }

    fn check(&mut self, value: &JsValue, predicate: impl Fn(&v8::Local<v8::Value>) -> bool) -> bool {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        predicate(&local)
    }

    // ---- JSON interop ----

    /// Serialize a script value through the engine's JSON codec.
    ///
    /// Fails for values JSON cannot represent (functions, cycles,
    /// `undefined`).
    pub fn to_json(&mut self, value: &JsValue) -> Result<serde_json::Value, JsError> {
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let local = v8::Local::new(scope, &value.inner);
        let Some(json) = v8::json::stringify(scope, local) else {
            return Err(JsError::new("value is not JSON-serializable", "<json>", None));
        };
        let text = json.to_rust_string_lossy(scope);
        serde_json::from_str(&text)
            .map_err(|e| JsError::new(format!("value is not JSON-serializable: {e}"), "<json>", None))
    }

    /// Build a script value from JSON data.
    pub fn from_json(&mut self, value: &serde_json::Value) -> Result<JsValue, JsError> {
        let text = value.to_string();
        let scope = pin!(v8::HandleScope::new(self.isolate.get()));
        let mut scope = scope.init();
        let context = v8::Local::new(&scope, &self.context);
        let scope = &mut v8::ContextScope::new(&mut scope, context);

        let Some(source) = v8::String::new(scope, &text) else {
            return Err(JsError::new("JSON text too large for engine string", "<json>", None));
        };
        let Some(parsed) = v8::json::parse(scope, source) else {
            return Err(JsError::new("engine rejected JSON text", "<json>", None));
        };
        Ok(JsValue::from_global(v8::Global::new(scope.as_ref(), parsed)))
    }

    // ---- events ----

    /// Register `callback` for `eventName`, replacing any existing one.
    ///
    /// Event names are free-form strings - this is a general-purpose
    /// event mechanism, not a fixed set.
    pub fn set_event_callback(
        &self,
        event_name: &str,
        callback: impl Fn(Vec<JsValue>) + Send + Sync + 'static,
    ) {
        self.state.events.set(event_name, Arc::new(callback));
    }

    pub fn set_event_callback_arc(&self, event_name: &str, callback: EventCallback) {
        self.state.events.set(event_name, callback);
    }

    /// Remove the callback for `eventName`. No-op if absent.
    pub fn remove_event_callback(&self, event_name: &str) {
        self.state.events.remove(event_name);
    }

    /// Trigger `eventName` with `params`. No-op when unregistered.
    pub fn trigger_event(&self, event_name: &str, params: Vec<JsValue>) {
        self.state.events.trigger(event_name, params);
    }

    // ---- weak value store ----

    /// Store values so that callbacks can reference them without
    /// keeping the engine alive through a cycle. Thread-safe.
    pub fn store_js_values(&self, values: Vec<JsValue>) -> Result<JsWeakValuesId, WeakValuesError> {
        self.state
            .store_weak(values.into_iter().map(JsValue::into_global).collect())
    }

    /// Extract and remove previously stored values. Thread-safe. Each
    /// token is redeemable exactly once.
    pub fn take_js_values(&self, id: JsWeakValuesId) -> Result<Vec<JsValue>, WeakValuesError> {
        Ok(self
            .state
            .take_weak(id)?
            .into_iter()
            .map(JsValue::from_global)
            .collect())
    }

    /// A cloneable, thread-safe handle to the weak value store.
    pub fn weak_values_handle(&self) -> WeakValuesHandle {
        WeakValuesHandle {
            state: self.state.clone(),
        }
    }

    // ---- async pump ----

    /// Drain all queued completions, re-entering the context to invoke
    /// the stored script callbacks, then run a microtask checkpoint.
    pub fn process_pending_callbacks(&mut self) {
        while let Ok(message) = self.completion_rx.try_recv() {
            self.state.finish_task();
            let state = self.state.clone();

            let scope = pin!(v8::HandleScope::new(self.isolate.get()));
            let mut scope = scope.init();
            let context = v8::Local::new(&scope, &self.context);
            let scope = &mut v8::ContextScope::new(&mut scope, context);

            match message {
                Completion::TimerFired(id) => bridge::run_timer_task(scope, &state, id),
                Completion::RequestDone(id, result) => {
                    bridge::run_request_callback(scope, &state, id, result)
                }
                Completion::FileRead(id, result) => {
                    bridge::run_file_read_callback(scope, &state, id, result)
                }
                Completion::FileWritten(id, result) => {
                    bridge::run_file_write_callback(scope, &state, id, result)
                }
            }
        }

        self.isolate.get().perform_microtask_checkpoint();
    }

    /// Pump completions until no scheduled native operation remains.
    ///
    /// Callbacks may schedule further operations; those are awaited
    /// too. Wall-clock duration is bounded by the collaborators, not by
    /// this method.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.process_pending_callbacks();
            if self.pending_native_tasks() == 0 {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Number of scheduled native operations that have not completed
    /// and been dispatched yet.
    pub fn pending_native_tasks(&self) -> usize {
        self.state.pending_tasks.load(Ordering::SeqCst)
    }

    // ---- memory ----

    /// Ask the engine to perform a garbage collection pass.
    pub fn gc(&mut self) {
        self.isolate.get().low_memory_notification();
    }

    /// Signal critically low memory; the engine responds with its most
    /// aggressive collection.
    pub fn notify_low_memory(&mut self) {
        self.isolate.get().low_memory_notification();
    }
}

impl Drop for JsEngine {
    fn drop(&mut self) {
        // Invalidate the cross-thread state first so in-flight takes and
        // late completions observe a closed store, and drop every stored
        // handle while the isolate is still alive. The remaining fields
        // then drop in declaration order: context before isolate.
        let drained = self.state.close();
        drop(drained);
    }
}
