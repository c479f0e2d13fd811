//! Error taxonomy for the harness.
//!
//! Two failure classes, kept deliberately separate: a `StartupError` is fatal
//! and terminates the process after the fixed failure result has been
//! written; a `RequestError` is scoped to one invocation and is converted
//! into an `{"error": ...}` result so the control protocol survives it.

use serde_json::{Value, json};

/// The only error text a failed startup is allowed to put on the control
/// channel. Diagnostic detail goes to the error log stream instead.
pub const STARTUP_FAILURE_MESSAGE: &str = "Cannot start action. Check logs for details.";

/// Fatal initialization failure: bad payload, missing entry module, broken
/// virtualenv, or an entry point that cannot be bound.
#[derive(Debug)]
pub struct StartupError {
    diagnostic: String,
}

impl StartupError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }

    /// Full diagnostic line for the error log stream.
    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.diagnostic)
    }
}

impl std::error::Error for StartupError {}

/// The fixed result written on the control channel when startup fails.
pub fn startup_failure_result() -> Value {
    json!({ "error": STARTUP_FAILURE_MESSAGE })
}

/// Per-invocation failure, recovered at the run-loop boundary.
#[derive(Debug)]
pub enum RequestError {
    /// Required environment metadata for context construction is missing or
    /// malformed.
    Context(String),
    /// The entry point (or the payload rewrite in front of it) raised.
    /// `detail` carries the full error with stack where available; `message`
    /// is the compact line that goes into the result.
    Dispatch { message: String, detail: String },
    /// The entry point returned a value that cannot be encoded as JSON.
    Serialization(String),
}

impl RequestError {
    pub fn context(message: impl Into<String>) -> Self {
        RequestError::Context(message.into())
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        let message = message.into();
        let detail = message.clone();
        RequestError::Dispatch { message, detail }
    }

    pub fn dispatch_with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        RequestError::Dispatch {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Compact text for the result's `error` field.
    pub fn message(&self) -> &str {
        match self {
            RequestError::Context(message) => message,
            RequestError::Dispatch { message, .. } => message,
            RequestError::Serialization(message) => message,
        }
    }

    /// Full diagnostic for the error log stream.
    pub fn detail(&self) -> &str {
        match self {
            RequestError::Context(message) => message,
            RequestError::Dispatch { detail, .. } => detail,
            RequestError::Serialization(message) => message,
        }
    }

    /// The result written on the control channel for this failure.
    pub fn to_result(&self) -> Value {
        json!({ "error": self.message() })
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for RequestError {}
