use jshost::{JsEngine, LogLevel, LogSink, Timer, TimerTask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fires the completion on the calling stack. Deterministic stand-in
/// for tests that drive the pump by hand.
struct ImmediateTimer;

impl Timer for ImmediateTimer {
    fn schedule(&self, _delay: Duration, task: TimerTask) {
        task();
    }
}

#[derive(Default)]
struct CapturingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl LogSink for CapturingLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

#[tokio::test]
async fn zero_delay_timer_fires_once_with_arguments() {
    let mut engine = JsEngine::new();

    engine
        .evaluate(
            "let calls = []; setTimeout((a, b) => { calls.push(a, b); }, 0, 'x', 42);",
            "test.js",
        )
        .unwrap();
    engine.run_until_idle().await;

    let joined = engine.evaluate("calls.join(',')", "test.js").unwrap();
    assert_eq!(engine.as_string(&joined), "x,42");
    let count = engine.evaluate("calls.length", "test.js").unwrap();
    assert_eq!(engine.as_i64(&count), Some(2));
}

#[tokio::test]
async fn timer_callback_can_schedule_more_timers() {
    let mut engine = JsEngine::new();

    engine
        .evaluate(
            "let seq = []; setTimeout(() => { seq.push(1); setTimeout(() => { seq.push(2); }, 0); }, 0);",
            "test.js",
        )
        .unwrap();
    engine.run_until_idle().await;

    let joined = engine.evaluate("seq.join('')", "test.js").unwrap();
    assert_eq!(engine.as_string(&joined), "12");
}

#[tokio::test]
async fn two_timers_both_fire() {
    let mut engine = JsEngine::new();

    engine
        .evaluate(
            "let hits = 0; setTimeout(() => { hits += 1; }, 0); setTimeout(() => { hits += 1; }, 1);",
            "test.js",
        )
        .unwrap();
    engine.run_until_idle().await;

    let hits = engine.evaluate("hits", "test.js").unwrap();
    assert_eq!(engine.as_i64(&hits), Some(2));
}

#[test]
fn injected_timer_dispatches_through_the_pump() {
    let mut engine = JsEngine::builder().timer(ImmediateTimer).build();

    engine
        .evaluate("let hits = 0; setTimeout(() => { hits += 1; }, 5);", "test.js")
        .unwrap();

    // Completion is queued but the script callback has not run yet.
    assert_eq!(engine.pending_native_tasks(), 1);
    let before = engine.evaluate("hits", "test.js").unwrap();
    assert_eq!(engine.as_i64(&before), Some(0));

    engine.process_pending_callbacks();

    assert_eq!(engine.pending_native_tasks(), 0);
    let after = engine.evaluate("hits", "test.js").unwrap();
    assert_eq!(engine.as_i64(&after), Some(1));
}

#[test]
fn timer_callback_error_is_contained_and_logged() {
    let log = Arc::new(CapturingLog::default());
    let mut engine = JsEngine::builder()
        .timer(ImmediateTimer)
        .log_sink(log.clone())
        .build();

    engine
        .evaluate("setTimeout(() => { throw new Error('late boom'); }, 0);", "test.js")
        .unwrap();
    engine.process_pending_callbacks();

    {
        let entries = log.entries.lock().unwrap();
        assert!(
            entries
                .iter()
                .any(|(level, msg)| *level == LogLevel::Error && msg.contains("late boom")),
            "log entries: {entries:?}"
        );
    }

    // The failure stayed inside the callback boundary.
    let value = engine.evaluate("2 + 2", "test.js").unwrap();
    assert_eq!(engine.as_i64(&value), Some(4));
}

#[test]
fn set_timeout_without_callback_throws_type_error() {
    let mut engine = JsEngine::new();

    let err = engine.evaluate("setTimeout(5, 0)", "test.js").unwrap_err();
    assert!(err.message.contains("setTimeout"), "got: {}", err.message);
}

#[tokio::test]
async fn dropping_engine_with_pending_timer_is_safe() {
    let fired = Arc::new(AtomicBool::new(false));

    {
        let mut engine = JsEngine::new();
        let flag = fired.clone();
        engine.set_event_callback("timer-ran", move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        engine
            .evaluate("setTimeout(() => { _triggerEvent('timer-ran'); }, 20);", "test.js")
            .unwrap();
        // Engine drops here, timer still pending.
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fired.load(Ordering::SeqCst));
}
