//! Native bindings bridging script calls to the external collaborators.
//!
//! Request path: a script-visible native captures the call arguments
//! into the weak value store, then hands the collaborator a completion
//! closure holding only the list ID and a channel sender. Completion
//! path: the engine pump re-enters the context and the handlers here
//! take the stored values back out and invoke the script callback.

use std::pin::pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use v8;

use crate::engine::{Completion, EngineState};
use crate::log_sink::LogLevel;
use crate::value::JsValue;
use crate::weak_values::JsWeakValuesId;
use crate::web_request::{HttpRequest, HttpResponse};

/// Register a value on the global object.
macro_rules! register_global {
    ($scope:expr, $name:literal, $value:expr) => {{
        let global = $scope.get_current_context().global($scope);
        let key = v8::String::new($scope, $name).unwrap();
        global.set($scope, key.into(), $value.into());
    }};
}

/// Install every native binding on the context's global object.
///
/// Called once, while the context is being created.
pub(crate) fn install(scope: &mut v8::PinScope, state: &Arc<EngineState>) {
    // The engine state is reachable from script-called natives through
    // this external. It points at the weak self-reference embedded in
    // the state itself, so holding the context does not keep the engine
    // alive, and natives upgrade (or bail) on every call.
    let state_ptr = &state.self_weak as *const Weak<EngineState> as *mut std::ffi::c_void;
    let external = v8::External::new(scope, state_ptr);
    register_global!(scope, "__engineState", external);

    let set_timeout_fn = v8::Function::new(scope, schedule_timer).unwrap();
    register_global!(scope, "setTimeout", set_timeout_fn);

    let trigger_event_fn = v8::Function::new(scope, trigger_event).unwrap();
    register_global!(scope, "_triggerEvent", trigger_event_fn);

    let log_fn = v8::Function::new(scope, log_message).unwrap();
    register_global!(scope, "__log", log_fn);

    // Dispatch for callbacks registered through the facade: the wrapper
    // function produced there calls `__nativeCall(id, ...args)`.
    let native_call_fn = v8::Function::new(
        scope,
        |scope: &mut v8::PinScope,
         args: v8::FunctionCallbackArguments,
         mut rv: v8::ReturnValue| {
            let Some(state) = engine_state(scope) else {
                return;
            };
            let Some(id) = args.get(0).number_value(scope) else {
                return;
            };
            let callback = state.native_callbacks.lock().unwrap().get(id as u64);
            let Some(callback) = callback else {
                return;
            };
            let call_args: Vec<v8::Local<v8::Value>> =
                (1..args.length()).map(|i| args.get(i)).collect();
            callback(scope, &call_args, &mut rv);
        },
    )
    .unwrap();
    register_global!(scope, "__nativeCall", native_call_fn);

    let web_request_obj = v8::Object::new(scope);
    let get_fn = v8::Function::new(scope, web_request_get).unwrap();
    let get_key = v8::String::new(scope, "GET").unwrap();
    web_request_obj.set(scope, get_key.into(), get_fn.into());
    register_global!(scope, "_webRequest", web_request_obj);

    let file_system_obj = v8::Object::new(scope);
    let read_fn = v8::Function::new(scope, file_system_read).unwrap();
    let read_key = v8::String::new(scope, "read").unwrap();
    file_system_obj.set(scope, read_key.into(), read_fn.into());
    let write_fn = v8::Function::new(scope, file_system_write).unwrap();
    let write_key = v8::String::new(scope, "write").unwrap();
    file_system_obj.set(scope, write_key.into(), write_fn.into());
    register_global!(scope, "_fileSystem", file_system_obj);

    install_console(scope);
}

/// Recover the engine state installed by [`install`].
///
/// Returns `None` when the global was tampered with or the engine is
/// already gone, in which case natives silently do nothing.
fn engine_state(scope: &mut v8::PinScope) -> Option<Arc<EngineState>> {
    let global = scope.get_current_context().global(scope);
    let state_key = v8::String::new(scope, "__engineState")?;
    let state_val = global.get(scope, state_key.into())?;

    if !state_val.is_external() {
        return None;
    }

    let external: v8::Local<v8::External> = state_val.try_into().ok()?;
    // SAFETY: the external was created in `install` from the weak
    // self-reference stored inside `EngineState`. Natives only run
    // while script executes, which requires the engine (and therefore a
    // strong reference to the state) to be alive, so the pointee is
    // valid here; `upgrade` covers the teardown window.
    let weak = unsafe { &*(external.value() as *const Weak<EngineState>) };
    weak.upgrade()
}

fn throw_type_error(scope: &mut v8::PinScope, message: &str) {
    if let Some(message) = v8::String::new(scope, message) {
        let exception = v8::Exception::type_error(scope, message);
        scope.throw_exception(exception);
    }
}

/// Convert call arguments from `from` onwards into persistent handles.
fn collect_args(
    scope: &mut v8::PinScope,
    args: &v8::FunctionCallbackArguments,
    from: i32,
) -> Vec<v8::Global<v8::Value>> {
    (from..args.length())
        .map(|i| v8::Global::new(scope, args.get(i)))
        .collect()
}

/// `setTimeout(callback, delay, ...args)`.
///
/// The full argument list is captured into the weak value store; the
/// timer collaborator only ever sees the opaque list ID.
fn schedule_timer(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 2 || !args.get(0).is_function() {
        throw_type_error(scope, "setTimeout expects a callback and a delay");
        return;
    }

    let delay_ms = args.get(1).number_value(scope).unwrap_or(0.0).max(0.0) as u64;
    let values = collect_args(scope, &args, 0);
    let Ok(id) = state.store_weak(values) else {
        return;
    };

    state.begin_task();
    let done = state.completions.clone();
    state.timer.schedule(
        Duration::from_millis(delay_ms),
        Box::new(move || done.send(Completion::TimerFired(id))),
    );
}

/// `_webRequest.GET(url, headers, callback)`.
fn web_request_get(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 3 || !args.get(2).is_function() {
        throw_type_error(scope, "GET expects a url, a headers object and a callback");
        return;
    }

    let url = match args.get(0).to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope),
        None => return,
    };
    let headers = read_string_pairs(scope, args.get(1));

    let values = collect_args(scope, &args, 2);
    let Ok(id) = state.store_weak(values) else {
        return;
    };

    state.begin_task();
    let done = state.completions.clone();
    state.web_request.perform(
        HttpRequest { url, headers },
        Box::new(move |result| done.send(Completion::RequestDone(id, result))),
    );
}

/// `_fileSystem.read(path, callback)`.
fn file_system_read(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 2 || !args.get(1).is_function() {
        throw_type_error(scope, "read expects a path and a callback");
        return;
    }

    let path = match args.get(0).to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope),
        None => return,
    };

    let values = collect_args(scope, &args, 1);
    let Ok(id) = state.store_weak(values) else {
        return;
    };

    state.begin_task();
    let done = state.completions.clone();
    state
        .file_system
        .read(&path, Box::new(move |result| done.send(Completion::FileRead(id, result))));
}

/// `_fileSystem.write(path, content, callback)`.
fn file_system_write(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 3 || !args.get(2).is_function() {
        throw_type_error(scope, "write expects a path, content and a callback");
        return;
    }

    let path = match args.get(0).to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope),
        None => return,
    };
    let data = match args.get(1).to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope).into_bytes(),
        None => return,
    };

    let values = collect_args(scope, &args, 2);
    let Ok(id) = state.store_weak(values) else {
        return;
    };

    state.begin_task();
    let done = state.completions.clone();
    state.file_system.write(
        &path,
        data,
        Box::new(move |result| done.send(Completion::FileWritten(id, result))),
    );
}

/// `_triggerEvent(name, ...params)` - raise a registry event from script.
fn trigger_event(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 1 {
        return;
    }
    let name = match args.get(0).to_string(scope) {
        Some(s) => s.to_rust_string_lossy(scope),
        None => return,
    };

    let params = collect_args(scope, &args, 1)
        .into_iter()
        .map(JsValue::from_global)
        .collect();
    state.events.trigger(&name, params);
}

/// `__log(level, message)` backing the console glue.
fn log_message(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut _rv: v8::ReturnValue,
) {
    let Some(state) = engine_state(scope) else {
        return;
    };

    if args.length() < 2 {
        return;
    }

    let level = match args.get(0).to_uint32(scope).map(|v| v.value()) {
        Some(0) => LogLevel::Error,
        Some(1) => LogLevel::Warn,
        Some(2) => LogLevel::Info,
        Some(3) => LogLevel::Debug,
        Some(4) => LogLevel::Trace,
        _ => LogLevel::Info,
    };
    let message = args.get(1).to_rust_string_lossy(scope);
    state.log.log(level, &message);
}

/// Read an object's own enumerable string properties as key/value pairs.
fn read_string_pairs(
    scope: &mut v8::PinScope,
    value: v8::Local<v8::Value>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    if let Some(object) = value.to_object(scope)
        && let Some(props) = object.get_own_property_names(scope, Default::default())
    {
        for i in 0..props.length() {
            if let Some(key_val) = props.get_index(scope, i)
                && let Some(key_str) = key_val.to_string(scope)
            {
                let key = key_str.to_rust_string_lossy(scope);

                if let Some(val) = object.get(scope, key_val)
                    && let Some(val_str) = val.to_string(scope)
                {
                    pairs.push((key, val_str.to_rust_string_lossy(scope)));
                }
            }
        }
    }

    pairs
}

fn install_console(scope: &mut v8::PinScope) {
    let code = r#"
        function __formatLogArg(a) {
            if (a instanceof Error) {
                return a.stack || (a.name + ': ' + a.message);
            }

            if (typeof a === 'object' && a !== null) {
                try {
                    return JSON.stringify(a);
                } catch (e) {
                    return String(a);
                }
            }

            return String(a);
        }

        globalThis.console = {
            log: function(...args) {
                __log(2, args.map(__formatLogArg).join(' '));
            },
            info: function(...args) {
                __log(2, args.map(__formatLogArg).join(' '));
            },
            warn: function(...args) {
                __log(1, args.map(__formatLogArg).join(' '));
            },
            error: function(...args) {
                __log(0, args.map(__formatLogArg).join(' '));
            },
            debug: function(...args) {
                __log(3, args.map(__formatLogArg).join(' '));
            },
            trace: function(...args) {
                __log(4, args.map(__formatLogArg).join(' '));
            }
        };
    "#;

    let code_str = v8::String::new(scope, code).unwrap();
    let script = v8::Script::compile(scope, code_str, None).unwrap();
    script.run(scope).unwrap();
}

// ---- completion side ----

/// Timer fired: the stored list is (callback, delay, ...args); invoke
/// the callback with the extra arguments.
pub(crate) fn run_timer_task(
    scope: &mut v8::PinScope,
    state: &Arc<EngineState>,
    id: JsWeakValuesId,
) {
    let mut values = match state.take_weak(id) {
        Ok(values) => values,
        Err(_) => {
            state.log.log(
                LogLevel::Warn,
                "timer completion ignored: stored values already gone",
            );
            return;
        }
    };
    if values.len() < 2 {
        return;
    }

    let callback = values.remove(0);
    values.remove(0); // the delay, no longer of interest

    let call_args: Vec<v8::Local<v8::Value>> =
        values.iter().map(|g| v8::Local::new(scope, g)).collect();
    invoke_stored(scope, state, &callback, &call_args);
}

/// Request completed: build the response object and invoke the stored
/// callback with it. Transport failures arrive as an `error` field, not
/// as a native fault.
pub(crate) fn run_request_callback(
    scope: &mut v8::PinScope,
    state: &Arc<EngineState>,
    id: JsWeakValuesId,
    result: Result<HttpResponse, String>,
) {
    let mut values = match state.take_weak(id) {
        Ok(values) => values,
        Err(_) => {
            state.log.log(
                LogLevel::Warn,
                "request completion ignored: stored values already gone",
            );
            return;
        }
    };
    if values.is_empty() {
        return;
    }
    let callback = values.remove(0);

    let response = v8::Object::new(scope);
    match result {
        Ok(ok) => {
            set_number(scope, response, "status", ok.status as f64);

            let headers = v8::Object::new(scope);
            for (key, value) in &ok.headers {
                set_string(scope, headers, key, value);
            }
            if let Some(headers_key) = v8::String::new(scope, "headers") {
                response.set(scope, headers_key.into(), headers.into());
            }

            let text = String::from_utf8_lossy(&ok.body);
            set_string(scope, response, "text", &text);
        }
        Err(error) => {
            set_number(scope, response, "status", 0.0);
            set_string(scope, response, "error", &error);
        }
    }

    invoke_stored(scope, state, &callback, &[response.into()]);
}

/// File read completed: invoke the stored callback with
/// `{content}` or `{error}`.
pub(crate) fn run_file_read_callback(
    scope: &mut v8::PinScope,
    state: &Arc<EngineState>,
    id: JsWeakValuesId,
    result: Result<Vec<u8>, String>,
) {
    let mut values = match state.take_weak(id) {
        Ok(values) => values,
        Err(_) => return,
    };
    if values.is_empty() {
        return;
    }
    let callback = values.remove(0);

    let outcome = v8::Object::new(scope);
    match result {
        Ok(data) => set_string(scope, outcome, "content", &String::from_utf8_lossy(&data)),
        Err(error) => set_string(scope, outcome, "error", &error),
    }

    invoke_stored(scope, state, &callback, &[outcome.into()]);
}

/// File write completed: invoke the stored callback with `{}` or
/// `{error}`.
pub(crate) fn run_file_write_callback(
    scope: &mut v8::PinScope,
    state: &Arc<EngineState>,
    id: JsWeakValuesId,
    result: Result<(), String>,
) {
    let mut values = match state.take_weak(id) {
        Ok(values) => values,
        Err(_) => return,
    };
    if values.is_empty() {
        return;
    }
    let callback = values.remove(0);

    let outcome = v8::Object::new(scope);
    if let Err(error) = result {
        set_string(scope, outcome, "error", &error);
    }

    invoke_stored(scope, state, &callback, &[outcome.into()]);
}

/// Call a stored script callback. An error thrown by the callback is
/// contained here and reported through the log sink - it must not
/// escape into the collaborator's completion path.
fn invoke_stored(
    scope: &mut v8::PinScope,
    state: &Arc<EngineState>,
    callback: &v8::Global<v8::Value>,
    args: &[v8::Local<v8::Value>],
) {
    let local = v8::Local::new(scope, callback);
    let function: v8::Local<v8::Function> = match local.try_into() {
        Ok(function) => function,
        Err(_) => return,
    };
    let recv = v8::undefined(scope);

    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();

    if function.call(&tc, recv.into(), args).is_none() {
        let message = tc
            .exception()
            .and_then(|e| e.to_string(&tc))
            .map(|s| s.to_rust_string_lossy(&tc))
            .unwrap_or_else(|| "unknown script error".to_string());
        state.log.log(
            LogLevel::Error,
            &format!("uncaught error in async callback: {message}"),
        );
    }
}

fn set_string(scope: &mut v8::PinScope, object: v8::Local<v8::Object>, key: &str, value: &str) {
    if let Some(key) = v8::String::new(scope, key)
        && let Some(value) = v8::String::new(scope, value)
    {
        object.set(scope, key.into(), value.into());
    }
}

fn set_number(scope: &mut v8::PinScope, object: v8::Local<v8::Object>, key: &str, value: f64) {
    if let Some(key) = v8::String::new(scope, key) {
        let value = v8::Number::new(scope, value);
        object.set(scope, key.into(), value.into());
    }
}
