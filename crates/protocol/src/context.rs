//! Per-invocation activation context.
//!
//! The context is assembled from reserved environment entries right before a
//! two-argument entry function runs. Assembly failure is a per-request error:
//! the invocation fails but the harness keeps serving.

use serde_json::Value;

use crate::config::ContextProfile;
use crate::env::EnvStore;
use crate::error::RequestError;

/// Identity, addressing, and deadline facts for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationContext {
    pub function_name: String,
    pub function_version: String,
    pub activation_id: String,
    pub request_id: Option<String>,
    /// Absolute deadline, epoch milliseconds.
    pub deadline_ms: u64,
    pub api_host: Option<String>,
    pub api_key: String,
    pub namespace: Option<String>,
}

fn required(env: &EnvStore, key: &str) -> Result<String, RequestError> {
    env.get(key)
        .map(str::to_string)
        .ok_or_else(|| {
            RequestError::context(format!("missing required environment entry '{key}'"))
        })
}

impl ActivationContext {
    /// Assemble a context from the environment store. The profile decides
    /// whether the request id, API host, and namespace entries are required
    /// or merely picked up when present.
    pub fn from_store(env: &EnvStore, profile: ContextProfile) -> Result<Self, RequestError> {
        let function_name = required(env, "__OW_ACTION_NAME")?;
        let function_version = required(env, "__OW_ACTION_VERSION")?;
        let activation_id = required(env, "__OW_ACTIVATION_ID")?;
        let deadline_raw = required(env, "__OW_DEADLINE")?;
        let deadline_ms = deadline_raw.parse::<u64>().map_err(|_| {
            RequestError::context(format!(
                "invalid '__OW_DEADLINE' value '{deadline_raw}': expected epoch milliseconds"
            ))
        })?;

        let (request_id, api_host, namespace) = match profile {
            ContextProfile::Full => (
                Some(required(env, "__OW_TRANSACTION_ID")?),
                Some(required(env, "__OW_API_HOST")?),
                Some(required(env, "__OW_NAMESPACE")?),
            ),
            ContextProfile::Lite => (
                env.get("__OW_TRANSACTION_ID").map(str::to_string),
                env.get("__OW_API_HOST").map(str::to_string),
                env.get("__OW_NAMESPACE").map(str::to_string),
            ),
        };

        let api_key = env.get("__OW_API_KEY").unwrap_or_default().to_string();

        Ok(Self {
            function_name,
            function_version,
            activation_id,
            request_id,
            deadline_ms,
            api_host,
            api_key,
            namespace,
        })
    }

    /// Milliseconds left before the deadline at `now_ms`, clamped at zero.
    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        self.deadline_ms.saturating_sub(now_ms)
    }

    /// The JSON shape handed to the action. Optional fields are omitted
    /// rather than set to null.
    pub fn to_client_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(
            "functionName".to_string(),
            Value::String(self.function_name.clone()),
        );
        map.insert(
            "functionVersion".to_string(),
            Value::String(self.function_version.clone()),
        );
        map.insert(
            "activationId".to_string(),
            Value::String(self.activation_id.clone()),
        );
        if let Some(request_id) = &self.request_id {
            map.insert("requestId".to_string(), Value::String(request_id.clone()));
        }
        map.insert("deadline".to_string(), Value::from(self.deadline_ms));
        if let Some(api_host) = &self.api_host {
            map.insert("apiHost".to_string(), Value::String(api_host.clone()));
        }
        map.insert("apiKey".to_string(), Value::String(self.api_key.clone()));
        if let Some(namespace) = &self.namespace {
            map.insert("namespace".to_string(), Value::String(namespace.clone()));
        }
        Value::Object(map)
    }
}
