//! The harness environment store.
//!
//! Per-request metadata and init-time `env` entries live in one process-wide
//! key/value store with text values. The store is injected into the
//! components that need it rather than kept in ambient global state, but it
//! deliberately preserves the documented persistence behavior: entries
//! written by one invocation stay visible to every later invocation in the
//! same process.

use std::collections::BTreeMap;

use serde_json::Value;

/// Marker prefix for harness/supervisor-managed environment entries.
pub const RESERVED_PREFIX: &str = "__OW_";

/// Map a request metadata key to its reserved environment name, e.g.
/// `deadline` -> `__OW_DEADLINE`.
pub fn reserved_key(name: &str) -> String {
    format!("{}{}", RESERVED_PREFIX, name.to_uppercase())
}

/// Coerce a JSON value into store text: strings verbatim, everything else
/// as its compact JSON encoding.
pub fn coerce_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Process-wide environment state, seeded from the real environment at
/// startup and mutated only by the init `env` merge and per-request
/// metadata merges. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct EnvStore {
    entries: BTreeMap<String, String>,
}

impl EnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from the current process environment.
    pub fn from_process() -> Self {
        let entries = std::env::vars().collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Install init-message `env` entries, stringifying non-text values.
    pub fn merge_init_env(&mut self, env: &BTreeMap<String, Value>) {
        for (key, value) in env {
            self.entries.insert(key.clone(), coerce_value(value));
        }
    }

    /// True when the entry exists and is non-empty.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot for injection into the action runtime as `process.env`.
    pub fn snapshot(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(map)
    }
}
