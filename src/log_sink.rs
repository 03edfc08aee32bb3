//! Log sink collaborator.

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Accepts leveled diagnostic messages from the engine and from the
/// script-side `console` object.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

/// Default sink: forwards to `tracing`.
#[derive(Debug, Default)]
pub struct DefaultLogSink;

impl LogSink for DefaultLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "jshost", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "jshost", "{message}"),
            LogLevel::Info => tracing::info!(target: "jshost", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "jshost", "{message}"),
            LogLevel::Error => tracing::error!(target: "jshost", "{message}"),
        }
    }
}
