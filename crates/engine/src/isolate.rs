//! The embedded V8 isolate hosting one action.
//!
//! One `ActionRuntime` lives for the whole process: the entry point is bound
//! once (classic script or ES module), its calling shape is captured from
//! the function's declared parameter count, and every invocation afterwards
//! goes through the same trampoline. Invocations run one at a time; promise
//! results are driven to settlement on the isolate's event loop.

use std::path::Path;
use std::rc::Rc;

use deno_core::v8;
use deno_core::{JsRuntime, ModuleCodeString, PollEventLoopOptions, RuntimeOptions, serde_v8};
use serde_json::Value;

use protocol::{EnvStore, RequestError, StartupError};

use crate::dispatch::EntryShape;
use crate::loader::{ActionEsmLoader, js_string_literal};

pub struct ActionRuntime {
    runtime: JsRuntime,
    shape: Option<EntryShape>,
    wrapper_specifier: Option<deno_core::ModuleSpecifier>,
}

impl ActionRuntime {
    /// Isolate for classic-script actions; no module loader.
    pub fn for_script() -> Result<Self, StartupError> {
        let mut runtime = JsRuntime::new(RuntimeOptions::default());
        Self::bootstrap(&mut runtime)?;
        Ok(Self {
            runtime,
            shape: None,
            wrapper_specifier: None,
        })
    }

    /// Isolate for archive actions: module loader rooted at the working
    /// directory, with the entry wrapper as the main module.
    pub fn for_module(workdir: &Path, entry_name: &str) -> Result<Self, StartupError> {
        let loader = ActionEsmLoader::new(workdir, entry_name)
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;
        let wrapper_specifier = loader.wrapper_specifier().clone();
        let loader: Rc<dyn deno_core::ModuleLoader> = Rc::new(loader);
        let mut runtime = JsRuntime::new(RuntimeOptions {
            module_loader: Some(loader),
            ..Default::default()
        });
        Self::bootstrap(&mut runtime)?;
        Ok(Self {
            runtime,
            shape: None,
            wrapper_specifier: Some(wrapper_specifier),
        })
    }

    fn bootstrap(runtime: &mut JsRuntime) -> Result<(), StartupError> {
        // Console routed onto the process log streams, the env mirror, and
        // the invocation trampoline.
        const BOOTSTRAP: &str = r#"
            (function () {
                const core = Deno.core;
                const text = (args) => args.map((value) => {
                    if (typeof value === "string") return value;
                    try {
                        const encoded = JSON.stringify(value);
                        return encoded === undefined ? String(value) : encoded;
                    } catch (_err) {
                        return String(value);
                    }
                }).join(" ");
                globalThis.console = {
                    log(...args) { core.print(text(args) + "\n", false); },
                    info(...args) { core.print(text(args) + "\n", false); },
                    debug(...args) { core.print(text(args) + "\n", false); },
                    warn(...args) { core.print(text(args) + "\n", true); },
                    error(...args) { core.print(text(args) + "\n", true); },
                };

                globalThis.process = { env: {} };

                globalThis.__huskInvoke = async function (arity) {
                    const fn = globalThis.__huskEntry;
                    const payload = globalThis.__huskPayload;
                    if (arity === 0) {
                        return fn();
                    }
                    if (arity === 1) {
                        return fn(payload);
                    }
                    const fields = globalThis.__huskContext || {};
                    const ctx = Object.assign({}, fields);
                    ctx.getRemainingTimeInMillis = function () {
                        const deadline = Number(fields.deadline) || 0;
                        return Math.max(deadline - Date.now(), 0);
                    };
                    return fn(payload, ctx);
                };
            })();
        "#;

        runtime
            .execute_script("bootstrap.js", ModuleCodeString::from(BOOTSTRAP.to_string()))
            .map(|_| ())
            .map_err(|err| StartupError::new(format!("Failed to bootstrap isolate: {err}")))
    }

    /// The calling shape captured at bind time.
    pub fn entry_shape(&self) -> Option<EntryShape> {
        self.shape
    }

    /// Mirror the environment store into the isolate as `process.env`.
    /// Called before binding (so the entry module sees merged init env) and
    /// again before each invocation.
    pub fn set_env_snapshot(&mut self, env: &EnvStore) -> Result<(), String> {
        {
            deno_core::scope!(scope, &mut self.runtime);
            let current = scope.get_current_context();
            let global = current.global(scope);
            let snapshot = env.snapshot();
            let value = serde_v8::to_v8(scope, &snapshot)
                .map_err(|err| format!("env snapshot to v8: {err}"))?;
            let key =
                v8::String::new(scope, "__huskEnv").ok_or_else(|| "env key".to_string())?;
            global.set(scope, key.into(), value);
        }
        self.runtime
            .execute_script(
                "env.js",
                ModuleCodeString::from(
                    "globalThis.process.env = globalThis.__huskEnv ?? {};".to_string(),
                ),
            )
            .map(|_| ())
            .map_err(|err| format!("env refresh failed: {err}"))
    }

    /// Evaluate a dependency-environment activation script before binding.
    pub fn activate_virtualenv(&mut self, script_path: &Path) -> Result<(), StartupError> {
        let source = std::fs::read_to_string(script_path).map_err(|err| {
            StartupError::new(format!(
                "Invalid virtualenv: Failed to activate virtualenv {err}."
            ))
        })?;
        self.runtime
            .execute_script("activate_this.js", ModuleCodeString::from(source))
            .map(|_| ())
            .map_err(|err| {
                StartupError::new(format!(
                    "Invalid virtualenv: Failed to activate virtualenv {err}."
                ))
            })
    }

    /// Evaluate entry source as a classic script, then bind `entry_name`
    /// from `globalThis`.
    pub fn bind_script_entry(
        &mut self,
        source: &str,
        entry_name: &str,
    ) -> Result<(), StartupError> {
        self.runtime
            .execute_script("main__.js", ModuleCodeString::from(source.to_string()))
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;
        let entry_expr = format!("globalThis[{}]", js_string_literal(entry_name));
        self.capture_entry_shape(&entry_expr, entry_name)
    }

    /// Load the entry module through the module graph, then bind
    /// `entry_name` from the published wrapper binding.
    pub async fn bind_module_entry(&mut self, entry_name: &str) -> Result<(), StartupError> {
        let wrapper = self.wrapper_specifier.clone().ok_or_else(|| {
            StartupError::new("Invalid action: missing module entry specifier")
        })?;

        let module_id = self
            .runtime
            .load_main_es_module(&wrapper)
            .await
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;
        let eval = self.runtime.mod_evaluate(module_id);
        self.runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;
        eval.await
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;

        self.capture_entry_shape("globalThis.__huskEntry", entry_name)
    }

    /// Resolve the entry expression, check it is callable, store it for the
    /// trampoline, and capture its declared parameter count.
    fn capture_entry_shape(
        &mut self,
        entry_expr: &str,
        entry_name: &str,
    ) -> Result<(), StartupError> {
        let probe = format!(
            "(function () {{\n\
                 const fn = {entry_expr};\n\
                 if (fn === undefined || fn === null) return -1;\n\
                 if (typeof fn !== \"function\") return -2;\n\
                 globalThis.__huskEntry = fn;\n\
                 return fn.length;\n\
             }})()"
        );
        let value = self
            .runtime
            .execute_script("bind.js", ModuleCodeString::from(probe))
            .map_err(|err| StartupError::new(format!("Invalid action: {err}")))?;

        let length = {
            deno_core::scope!(scope, &mut self.runtime);
            let local = v8::Local::new(scope, &value);
            serde_v8::from_v8::<Value>(scope, local)
                .ok()
                .and_then(|decoded| decoded.as_i64())
                .unwrap_or(-2)
        };

        match length {
            -1 => Err(StartupError::new(format!(
                "Invalid action: '{entry_name}' is not defined"
            ))),
            -2 => Err(StartupError::new(format!(
                "Invalid action: '{entry_name}' is not callable"
            ))),
            count => {
                let shape = EntryShape::from_parameter_count(count.max(0) as u32);
                tracing::debug!("bound entry '{}' with parameter count {}", entry_name, count);
                self.shape = Some(shape);
                Ok(())
            }
        }
    }

    /// Run one invocation through the trampoline and decode the settled
    /// result.
    pub async fn invoke(
        &mut self,
        shape: EntryShape,
        payload: Value,
        context: Option<Value>,
    ) -> Result<Value, RequestError> {
        self.set_invoke_globals(&payload, context.as_ref())
            .map_err(RequestError::dispatch)?;

        let result = self
            .runtime
            .execute_script(
                "invoke.js",
                ModuleCodeString::from(shape.call_script().to_string()),
            )
            .map_err(|err| RequestError::dispatch(format!("Action invocation failed: {err}")))?;

        // The trampoline is async, so the result is a promise; run the event
        // loop only when it is still pending.
        let mut needs_event_loop = false;
        {
            deno_core::scope!(scope, &mut self.runtime);
            let local = v8::Local::new(scope, &result);
            if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
                if let v8::PromiseState::Pending = promise.state() {
                    needs_event_loop = true;
                }
            }
        }

        if needs_event_loop {
            self.runtime
                .run_event_loop(PollEventLoopOptions::default())
                .await
                .map_err(|err| {
                    RequestError::dispatch(format!("Action event loop failed: {err}"))
                })?;
        }

        deno_core::scope!(scope, &mut self.runtime);
        let local = v8::Local::new(scope, &result);

        let settled: Result<v8::Local<v8::Value>, RequestError> =
            if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
                match promise.state() {
                    v8::PromiseState::Fulfilled => Ok(promise.result(scope)),
                    v8::PromiseState::Rejected => {
                        let reason = promise.result(scope);
                        let message = reason.to_rust_string_lossy(scope);
                        let mut detail = message.clone();
                        if let Some(object) = reason.to_object(scope) {
                            if let Some(stack_key) = v8::String::new(scope, "stack") {
                                if let Some(stack) = object.get(scope, stack_key.into()) {
                                    if stack.is_string() {
                                        detail = stack.to_rust_string_lossy(scope);
                                    }
                                }
                            }
                        }
                        Err(RequestError::dispatch_with_detail(message, detail))
                    }
                    v8::PromiseState::Pending => Err(RequestError::dispatch(
                        "Action promise still pending after event loop",
                    )),
                }
            } else {
                Ok(local)
            };
        let value = settled?;

        if value.is_null_or_undefined() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_v8::from_v8::<Value>(scope, value).map_err(|err| {
            RequestError::Serialization(format!(
                "Action returned non-serializable result: {err}"
            ))
        })
    }

    fn set_invoke_globals(
        &mut self,
        payload: &Value,
        context: Option<&Value>,
    ) -> Result<(), String> {
        deno_core::scope!(scope, &mut self.runtime);
        let current = scope.get_current_context();
        let global = current.global(scope);

        let payload_value =
            serde_v8::to_v8(scope, payload).map_err(|err| format!("payload to v8: {err}"))?;
        let payload_key =
            v8::String::new(scope, "__huskPayload").ok_or_else(|| "payload key".to_string())?;
        global.set(scope, payload_key.into(), payload_value);

        let context_value = match context {
            Some(context) => serde_v8::to_v8(scope, context)
                .map_err(|err| format!("context to v8: {err}"))?,
            None => v8::undefined(scope).into(),
        };
        let context_key =
            v8::String::new(scope, "__huskContext").ok_or_else(|| "context key".to_string())?;
        global.set(scope, context_key.into(), context_value);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("tokio runtime")
            .block_on(future)
    }

    #[test]
    fn script_bind_captures_parameter_count() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry("function main(payload, ctx) { return payload; }", "main")
            .expect("bind");
        assert_eq!(runtime.entry_shape(), Some(EntryShape::PayloadAndContext));
    }

    #[test]
    fn missing_entry_name_is_reported() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        let err = runtime
            .bind_script_entry("function other() {}", "main")
            .expect_err("must fail");
        assert_eq!(err.diagnostic(), "Invalid action: 'main' is not defined");
    }

    #[test]
    fn non_callable_entry_is_reported() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        let err = runtime
            .bind_script_entry("const main = 42;", "main")
            .expect_err("must fail");
        assert_eq!(err.diagnostic(), "Invalid action: 'main' is not callable");
    }

    #[test]
    fn broken_source_is_an_invalid_action() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        let err = runtime
            .bind_script_entry("function main( {", "main")
            .expect_err("must fail");
        assert!(err.diagnostic().starts_with("Invalid action:"));
    }

    #[test]
    fn payload_round_trips_through_the_entry() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry("function main(x) { return { y: x.x + 1 }; }", "main")
            .expect("bind");
        let result = block_on(runtime.invoke(
            EntryShape::PayloadOnly,
            json!({"x": 41}),
            None,
        ))
        .expect("invoke");
        assert_eq!(result, json!({"y": 42}));
    }

    #[test]
    fn null_and_undefined_returns_become_empty_objects() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry("function main() { return null; }", "main")
            .expect("bind");
        let result =
            block_on(runtime.invoke(EntryShape::NoArgs, json!({}), None)).expect("invoke");
        assert_eq!(result, json!({}));

        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry("function main() {}", "main")
            .expect("bind");
        let result =
            block_on(runtime.invoke(EntryShape::NoArgs, json!({}), None)).expect("invoke");
        assert_eq!(result, json!({}));
    }

    #[test]
    fn async_entries_are_driven_to_completion() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry(
                "async function main(x) { await Promise.resolve(); return { n: x.n * 2 }; }",
                "main",
            )
            .expect("bind");
        let result = block_on(runtime.invoke(
            EntryShape::PayloadOnly,
            json!({"n": 21}),
            None,
        ))
        .expect("invoke");
        assert_eq!(result, json!({"n": 42}));
    }

    #[test]
    fn thrown_errors_carry_message_and_stack() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry("function main() { throw new Error('boom'); }", "main")
            .expect("bind");
        let err =
            block_on(runtime.invoke(EntryShape::NoArgs, json!({}), None)).expect_err("must fail");
        assert_eq!(err.message(), "Error: boom");
        assert!(err.detail().contains("at main"));
    }

    #[test]
    fn context_object_reaches_two_argument_entries() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        runtime
            .bind_script_entry(
                "function main(payload, ctx) {\n\
                     return {\n\
                         name: ctx.functionName,\n\
                         remaining: ctx.getRemainingTimeInMillis(),\n\
                     };\n\
                 }",
                "main",
            )
            .expect("bind");

        let context = json!({
            "functionName": "ns/echo",
            "deadline": 1u64,
        });
        let result = block_on(runtime.invoke(
            EntryShape::PayloadAndContext,
            json!({}),
            Some(context),
        ))
        .expect("invoke");
        assert_eq!(result["name"], json!("ns/echo"));
        // Deadline long past, so the clamp has to kick in.
        assert_eq!(result["remaining"], json!(0));
    }

    #[test]
    fn env_snapshot_is_visible_as_process_env() {
        let mut runtime = ActionRuntime::for_script().expect("runtime");
        let mut env = EnvStore::new();
        env.set("__OW_ACTIVATION_ID", "aid-7");
        runtime.set_env_snapshot(&env).expect("snapshot");
        runtime
            .bind_script_entry(
                "function main() { return { id: process.env.__OW_ACTIVATION_ID }; }",
                "main",
            )
            .expect("bind");
        let result =
            block_on(runtime.invoke(EntryShape::NoArgs, json!({}), None)).expect("invoke");
        assert_eq!(result, json!({"id": "aid-7"}));
    }

    #[test]
    fn module_entries_bind_through_the_wrapper() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("main__.js"),
            "import { bump } from \"./lib.js\";\n\
             export function main(x) { return { y: bump(x.x) }; }\n",
        )
        .expect("write entry");
        std::fs::write(dir.path().join("lib.js"), "export function bump(n) { return n + 1; }\n")
            .expect("write lib");

        let mut runtime = ActionRuntime::for_module(dir.path(), "main").expect("runtime");
        block_on(runtime.bind_module_entry("main")).expect("bind");
        assert_eq!(runtime.entry_shape(), Some(EntryShape::PayloadOnly));

        let result = block_on(runtime.invoke(
            EntryShape::PayloadOnly,
            json!({"x": 41}),
            None,
        ))
        .expect("invoke");
        assert_eq!(result, json!({"y": 42}));
    }

    #[test]
    fn module_global_assignment_is_a_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("main__.js"),
            "globalThis.main = function (x) { return { seen: x.ok }; };\n",
        )
        .expect("write entry");

        let mut runtime = ActionRuntime::for_module(dir.path(), "main").expect("runtime");
        block_on(runtime.bind_module_entry("main")).expect("bind");

        let result = block_on(runtime.invoke(
            EntryShape::PayloadOnly,
            json!({"ok": true}),
            None,
        ))
        .expect("invoke");
        assert_eq!(result, json!({"seen": true}));
    }

    #[test]
    fn virtualenv_script_failure_uses_virtualenv_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("activate_this.js");
        std::fs::write(&script, "throw new Error('bad venv');").expect("write");

        let mut runtime = ActionRuntime::for_script().expect("runtime");
        let err = runtime.activate_virtualenv(&script).expect_err("must fail");
        assert!(err
            .diagnostic()
            .starts_with("Invalid virtualenv: Failed to activate virtualenv "));
    }
}
