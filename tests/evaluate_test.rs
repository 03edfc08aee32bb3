use jshost::{JsEngine, v8};
use std::sync::{Arc, Mutex};

#[test]
fn evaluate_expression_returns_result() {
    let mut engine = JsEngine::new();

    let value = engine.evaluate("1+1", "test.js").unwrap();
    assert!(engine.is_number(&value));
    assert_eq!(engine.as_f64(&value), Some(2.0));
    assert_eq!(engine.as_i64(&value), Some(2));
}

#[test]
fn evaluate_string_and_bool() {
    let mut engine = JsEngine::new();

    let s = engine.evaluate("'a' + 'b'", "test.js").unwrap();
    assert!(engine.is_string(&s));
    assert_eq!(engine.as_string(&s), "ab");

    let b = engine.evaluate("1 < 2", "test.js").unwrap();
    assert!(engine.as_bool(&b));
}

#[test]
fn syntax_error_reports_message_and_filename() {
    let mut engine = JsEngine::new();

    let err = engine.evaluate("(", "bad.js").unwrap_err();
    assert!(!err.message.is_empty());
    assert_eq!(err.filename, "bad.js");

    // The engine stays usable after a compile error.
    let value = engine.evaluate("3 * 3", "ok.js").unwrap();
    assert_eq!(engine.as_i64(&value), Some(9));
}

#[test]
fn runtime_error_carries_thrown_message() {
    let mut engine = JsEngine::new();

    let err = engine
        .evaluate("function f() { throw new Error('boom'); } f();", "thrower.js")
        .unwrap_err();
    assert!(err.message.contains("boom"), "got: {}", err.message);
    assert_eq!(err.filename, "thrower.js");

    let value = engine.evaluate("'still alive'", "ok.js").unwrap();
    assert_eq!(engine.as_string(&value), "still alive");
}

#[test]
fn evaluation_state_persists_across_calls() {
    let mut engine = JsEngine::new();

    engine.evaluate("var counter = 10;", "setup.js").unwrap();
    engine.evaluate("counter += 5;", "bump.js").unwrap();
    let value = engine.evaluate("counter", "read.js").unwrap();
    assert_eq!(engine.as_i64(&value), Some(15));
}

#[test]
fn set_global_property_is_visible_to_scripts() {
    let mut engine = JsEngine::new();

    let answer = engine.new_value(42i64);
    engine.set_global_property("answer", &answer);

    let value = engine.evaluate("answer + 1", "test.js").unwrap();
    assert_eq!(engine.as_i64(&value), Some(43));
}

#[test]
fn global_object_is_an_object() {
    let mut engine = JsEngine::new();

    let global = engine.global_object();
    assert!(engine.is_object(&global));

    // Properties set through the facade appear on the same object.
    let marker = engine.new_value("here");
    engine.set_global_property("marker", &marker);
    let read_back = engine.get_property(&global, "marker").unwrap();
    assert_eq!(engine.as_string(&read_back), "here");
}

#[test]
fn new_object_with_properties() {
    let mut engine = JsEngine::new();

    let object = engine.new_object();
    assert!(engine.is_object(&object));

    let five = engine.new_value(5i64);
    engine.set_property(&object, "x", &five);
    let x = engine.get_property(&object, "x").unwrap();
    assert_eq!(engine.as_i64(&x), Some(5));

    engine.set_global_property("obj", &object);
    let doubled = engine.evaluate("obj.x * 2", "test.js").unwrap();
    assert_eq!(engine.as_i64(&doubled), Some(10));
}

#[test]
fn new_value_literals() {
    let mut engine = JsEngine::new();

    let null = engine.new_value(());
    assert!(engine.is_null(&null));

    let float = engine.new_value(2.5f64);
    assert_eq!(engine.as_f64(&float), Some(2.5));

    let truthy = engine.new_value(true);
    assert!(engine.as_bool(&truthy));

    let text = engine.new_value(String::from("owned"));
    assert_eq!(engine.as_string(&text), "owned");
}

#[test]
fn native_callback_is_invocable_from_script() {
    let mut engine = JsEngine::new();

    let seen_arg_counts = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen_arg_counts.clone();

    let add = engine
        .new_callback(
            move |scope: &mut v8::PinScope,
                  args: &[v8::Local<v8::Value>],
                  rv: &mut v8::ReturnValue| {
                recorder.lock().unwrap().push(args.len());
                let mut sum = 0.0;
                for arg in args {
                    sum += arg.number_value(scope).unwrap_or(0.0);
                }
                let result = v8::Number::new(scope, sum);
                rv.set(result.into());
            },
        )
        .unwrap();

    assert!(engine.is_function(&add));
    engine.set_global_property("add", &add);

    let value = engine.evaluate("add(1, 2, 3)", "test.js").unwrap();
    assert_eq!(engine.as_f64(&value), Some(6.0));
    assert_eq!(seen_arg_counts.lock().unwrap().as_slice(), &[3]);
}

#[test]
fn call_invokes_script_function_with_arguments() {
    let mut engine = JsEngine::new();

    let function = engine
        .evaluate("(function (a, b) { return a + b; })", "test.js")
        .unwrap();
    let one = engine.new_value(1i64);
    let two = engine.new_value(2i64);
    let result = engine.call(&function, &[one, two]).unwrap();
    assert_eq!(engine.as_i64(&result), Some(3));
}

#[test]
fn call_propagates_script_errors() {
    let mut engine = JsEngine::new();

    let function = engine
        .evaluate("(function () { throw new Error('from callee'); })", "test.js")
        .unwrap();
    let err = engine.call(&function, &[]).unwrap_err();
    assert!(err.message.contains("from callee"), "got: {}", err.message);
}

#[test]
fn json_interop_round_trip() {
    let mut engine = JsEngine::new();

    let value = engine
        .evaluate("({ a: 1, b: ['x', true], c: null })", "test.js")
        .unwrap();
    let json = engine.to_json(&value).unwrap();
    assert_eq!(json, serde_json::json!({"a": 1, "b": ["x", true], "c": null}));

    let rebuilt = engine.from_json(&json).unwrap();
    engine.set_global_property("data", &rebuilt);
    let probe = engine.evaluate("data.b[0] + data.a", "test.js").unwrap();
    assert_eq!(engine.as_string(&probe), "x1");
}

#[test]
fn to_json_rejects_functions() {
    let mut engine = JsEngine::new();

    let function = engine.evaluate("(function () {})", "test.js").unwrap();
    assert!(engine.to_json(&function).is_err());
}

#[test]
fn gc_requests_do_not_disturb_state() {
    let mut engine = JsEngine::new();

    engine.evaluate("var kept = 'still here';", "setup.js").unwrap();
    engine.gc();
    engine.notify_low_memory();
    let value = engine.evaluate("kept", "read.js").unwrap();
    assert_eq!(engine.as_string(&value), "still here");
}
