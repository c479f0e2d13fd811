//! Entry-point calling shapes and per-request dispatch.

use serde_json::Value;

use protocol::web::rewrite_web_event;
use protocol::{ActivationContext, EnvStore, HarnessConfig, RequestError};

use crate::isolate::ActionRuntime;

/// How the bound entry point is called. Fixed once at bind time from the
/// function's declared parameter count and never re-inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    /// `fn()`
    NoArgs,
    /// `fn(payload)`
    PayloadOnly,
    /// `fn(payload, ctx)`
    PayloadAndContext,
}

impl EntryShape {
    pub fn from_parameter_count(count: u32) -> Self {
        match count {
            0 => EntryShape::NoArgs,
            1 => EntryShape::PayloadOnly,
            _ => EntryShape::PayloadAndContext,
        }
    }

    /// The trampoline call for this shape.
    pub(crate) fn call_script(self) -> &'static str {
        match self {
            EntryShape::NoArgs => "globalThis.__huskInvoke(0)",
            EntryShape::PayloadOnly => "globalThis.__huskInvoke(1)",
            EntryShape::PayloadAndContext => "globalThis.__huskInvoke(2)",
        }
    }
}

/// Run one invocation: refresh the isolate's env mirror, build the context
/// when the shape wants one (and only then; zero- and one-argument entries
/// never fail on missing context metadata), apply the web-event rewrite if
/// enabled, and call the entry point.
pub async fn dispatch(
    runtime: &mut ActionRuntime,
    payload: Value,
    env: &EnvStore,
    config: &HarnessConfig,
) -> Result<Value, RequestError> {
    let shape = runtime
        .entry_shape()
        .ok_or_else(|| RequestError::dispatch("no entry point bound"))?;

    runtime.set_env_snapshot(env).map_err(RequestError::dispatch)?;

    let mut payload = payload;
    let context = if matches!(shape, EntryShape::PayloadAndContext) {
        let context = ActivationContext::from_store(env, config.context_profile)?;
        if config.http_event {
            rewrite_web_event(&mut payload);
        }
        Some(context.to_client_json())
    } else {
        None
    };

    runtime.invoke(shape, payload, context).await
}
