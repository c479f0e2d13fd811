//! # husk-stdio
//!
//! Diagnostic output for the husk action harness.
//!
//! Everything here writes to **stderr**. The harness shares stdout with the
//! action's own log stream, so harness diagnostics must never appear there.
//!
//! ## Format
//!
//! ```text
//! [component] message
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use stdio::{log, error, debug};
//!
//! log("init", "entry point bound");
//! error("serve", "request failed");
//! debug("env", "merged 3 metadata entries");
//! ```
//!
//! ## Log Levels
//!
//! Control output with the `LOG_LEVEL` environment variable:
//! - `error` - Errors only
//! - `info` - Default (startup + important messages)
//! - `debug` - Verbose output

use std::env;
use std::sync::OnceLock;

/// Log level for harness diagnostics
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

fn emit_line(line: &str) {
    eprintln!("{}", line);
}

/// Get the current log level (cached from LOG_LEVEL env var)
pub fn log_level() -> LogLevel {
    *LOG_LEVEL.get_or_init(|| {
        env::var("LOG_LEVEL")
            .map(|s| LogLevel::from_str(&s))
            .unwrap_or(LogLevel::Info)
    })
}

/// Check if debug logging is enabled
pub fn is_debug() -> bool {
    log_level() >= LogLevel::Debug
}

/// Check if info logging is enabled
pub fn is_info() -> bool {
    log_level() >= LogLevel::Info
}

/// Log a component message
/// Format: `[component] message`
///
/// # Example
/// ```
/// stdio::log("init", "entry point bound");
/// // Output: [init] entry point bound
/// ```
pub fn log(component: &str, message: &str) {
    if log_level() >= LogLevel::Info {
        emit_line(&format!("[{}] {}", component, message));
    }
}

/// Log an error (always shown)
/// Format: `[component] message`
pub fn error(component: &str, message: &str) {
    emit_line(&format!("[{}] {}", component, message));
}

/// Log a warning
/// Format: `[warn] [component] message`
pub fn warn(component: &str, message: &str) {
    emit_line(&format!("[warn] [{}] {}", component, message));
}

/// Debug log (only shown when LOG_LEVEL=debug)
///
/// # Example
/// ```
/// stdio::debug("env", "merged 3 metadata entries");
/// ```
pub fn debug(component: &str, message: &str) {
    if log_level() >= LogLevel::Debug {
        emit_line(&format!("[{}] {}", component, message));
    }
}

/// Print a raw line (no formatting).
pub fn raw(message: &str) {
    emit_line(message);
}

// ============================================================
// Macros for convenient formatting
// ============================================================

/// Log with format string support
///
/// # Example
/// ```
/// stdio::logf!("init", "bound '{}' with arity {}", "main", 2);
/// ```
#[macro_export]
macro_rules! logf {
    ($component:expr, $($arg:tt)*) => {
        if $crate::log_level() >= $crate::LogLevel::Info {
            $crate::raw(&format!(concat!("[", $component, "] {}"), format!($($arg)*)));
        }
    };
}

/// Error with format string support
#[macro_export]
macro_rules! errorf {
    ($component:expr, $($arg:tt)*) => {
        $crate::raw(&format!(concat!("[", $component, "] {}"), format!($($arg)*)));
    };
}

/// Debug with format string support (only shown when LOG_LEVEL=debug)
#[macro_export]
macro_rules! debugf {
    ($component:expr, $($arg:tt)*) => {
        if $crate::log_level() >= $crate::LogLevel::Debug {
            $crate::raw(&format!(concat!("[", $component, "] {}"), format!($($arg)*)));
        }
    };
}
