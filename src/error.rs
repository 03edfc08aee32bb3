//! Error types surfaced by the engine.

use std::fmt;

/// A compile or runtime failure inside script code.
///
/// Carries the exception message, the filename that was passed to
/// [`crate::JsEngine::evaluate`], and the line number when the engine
/// could determine one. Script errors are never fatal: the engine
/// remains fully usable after returning one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsError {
    pub message: String,
    pub filename: String,
    pub line: Option<usize>,
}

impl JsError {
    pub(crate) fn new(message: impl Into<String>, filename: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            message: message.into(),
            filename: filename.into(),
            line,
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} ({}:{})", self.message, self.filename, line),
            None => write!(f, "{} ({})", self.message, self.filename),
        }
    }
}

impl std::error::Error for JsError {}

/// Misuse of a weak value list token.
///
/// Token misuse is a caller bug rather than a runtime condition, but it
/// is reported as a defined error instead of being left undefined so
/// that racing a `take` against engine destruction stays observable and
/// harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WeakValuesError {
    /// The token was already taken, or never issued by this engine.
    #[error("weak value list id is stale or was already taken")]
    Stale,
    /// The engine was destroyed and the store drained.
    #[error("engine destroyed; weak value store is closed")]
    Closed,
}
