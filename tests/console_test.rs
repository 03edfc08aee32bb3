use jshost::{JsEngine, LogLevel, LogSink};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl LogSink for CapturingLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

#[test]
fn console_reaches_log_sink_with_level_mapping() {
    let log = Arc::new(CapturingLog::default());
    let mut engine = JsEngine::builder().log_sink(log.clone()).build();

    engine
        .evaluate(
            r#"
            console.log('hello', 1);
            console.info('fyi');
            console.warn('careful');
            console.error('bad');
            console.debug('details');
            console.trace('steps');
            "#,
            "test.js",
        )
        .unwrap();

    let entries = log.entries.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            (LogLevel::Info, "hello 1".to_string()),
            (LogLevel::Info, "fyi".to_string()),
            (LogLevel::Warn, "careful".to_string()),
            (LogLevel::Error, "bad".to_string()),
            (LogLevel::Debug, "details".to_string()),
            (LogLevel::Trace, "steps".to_string()),
        ]
    );
}

#[test]
fn console_formats_objects_and_errors() {
    let log = Arc::new(CapturingLog::default());
    let mut engine = JsEngine::builder().log_sink(log.clone()).build();

    engine
        .evaluate("console.log({ a: 1 });", "test.js")
        .unwrap();

    let entries = log.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, r#"{"a":1}"#);
}
