//! Invocation-request parsing.
//!
//! Each control line after init is a JSON object. Its `value` member is the
//! action payload; every other top-level member is request metadata that maps
//! to an `__OW_`-prefixed environment entry.

use serde_json::Value;

use crate::env::{coerce_value, reserved_key, EnvStore};

/// One decoded invocation request: the action payload plus the metadata
/// entries that accompany it.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    payload: Value,
    metadata: Vec<(String, String)>,
}

impl InvocationRequest {
    /// Split a decoded control line into payload and metadata.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("request must be a JSON object".to_string());
        };

        let mut payload = Value::Object(serde_json::Map::new());
        let mut metadata = Vec::with_capacity(map.len());
        for (key, value) in map {
            if key == "value" {
                payload = value;
            } else {
                metadata.push((reserved_key(&key), coerce_value(&value)));
            }
        }

        Ok(Self { payload, metadata })
    }

    /// The action payload. A request without a `value` member gets an empty
    /// object; an explicit null passes through as null.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Install this request's metadata into the environment store.
    pub fn apply_metadata(&self, env: &mut EnvStore) {
        for (key, value) in &self.metadata {
            env.set(key.clone(), value.clone());
        }
    }
}
