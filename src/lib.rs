pub mod engine;
pub mod error;
pub mod events;
pub mod file_system;
pub mod log_sink;
pub mod scheduler;
pub mod timer;
pub mod value;
pub mod weak_values;
pub mod web_request;

mod bridge;
mod isolate;
mod platform;

// Core API
pub use engine::{JsEngine, JsEngineBuilder, WeakValuesHandle};
pub use error::{JsError, WeakValuesError};
pub use events::EventCallback;
pub use file_system::{DefaultFileSystem, FileSystem, ReadCallback, WriteCallback};
pub use log_sink::{DefaultLogSink, LogLevel, LogSink};
pub use scheduler::{Scheduler, SchedulerTask};
pub use timer::{DefaultTimer, Timer, TimerTask};
pub use value::{JsLiteral, JsValue};
pub use weak_values::JsWeakValuesId;
pub use web_request::{DefaultWebRequest, HttpRequest, HttpResponse, RequestCallback, WebRequest};

// Re-export the engine crate so embedders can write native callbacks
// against the exact version this crate was built with.
pub use v8;
