//! Init-message parsing.
//!
//! The first control line in init mode carries the action payload under a
//! `value` wrapper:
//!
//! ```json
//! {"value": {"env": {...}, "binary": false, "code": "...", "main": "main"}}
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// The action description delivered by the supervisor before the first
/// invocation.
#[derive(Debug, Clone)]
pub struct InitPayload {
    /// Extra environment entries to install before the code runs.
    pub env: BTreeMap<String, Value>,
    /// When true, `code` is a base64-encoded zip archive instead of script
    /// text.
    pub binary: bool,
    /// Script source or base64 archive, per `binary`.
    pub code: String,
    /// Name of the entry function to bind.
    pub main: String,
}

/// Wire shape. `env` may be absent or an explicit null; both mean empty.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    env: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    binary: bool,
    code: String,
    main: String,
}

#[derive(Debug, Deserialize)]
struct InitMessage {
    value: RawPayload,
}

impl InitPayload {
    /// Parse a decoded control line as an init message.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let message: InitMessage = serde_json::from_value(value)
            .map_err(|err| format!("invalid init message: {err}"))?;
        let raw = message.value;
        Ok(Self {
            env: raw.env.unwrap_or_default(),
            binary: raw.binary,
            code: raw.code,
            main: raw.main,
        })
    }
}
