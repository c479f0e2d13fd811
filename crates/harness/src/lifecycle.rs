//! The harness run loop.
//!
//! Lifecycle: ack on the control channel, initialize the action, ack again
//! once the entry point is bound, then serve one request per control line.
//! Startup failures are fatal (fixed Result, sentinel pair, exit 1); request
//! failures are scoped to their invocation and the loop keeps going. Every
//! cycle ends with exactly one Result line followed by one sentinel per log
//! stream, in that order.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde_json::Value;

use channel::{ControlLine, ControlReader, ControlWriter, emit_frame_pair};
use engine::{ActionRuntime, ENTRY_FILE, dispatch, install_payload, locate_activation_script};
use protocol::error::startup_failure_result;
use protocol::{EnvStore, HarnessConfig, InitPayload, InvocationRequest, StartupError};

/// Entry name used when the action code ships with the image.
const PRELOADED_ENTRY: &str = "main";

/// The long-lived harness process: control channel, log streams, the
/// environment store, and (after init) the isolate.
pub struct Harness<R, W, O, E> {
    config: HarnessConfig,
    workdir: PathBuf,
    env: EnvStore,
    control_in: ControlReader<R>,
    control_out: ControlWriter<W>,
    log_out: O,
    log_err: E,
}

impl<R: BufRead, W: Write, O: Write, E: Write> Harness<R, W, O, E> {
    pub fn new(
        config: HarnessConfig,
        workdir: PathBuf,
        env: EnvStore,
        control_in: R,
        control_out: W,
        log_out: O,
        log_err: E,
    ) -> Self {
        Self {
            config,
            workdir,
            env,
            control_in: ControlReader::new(control_in),
            control_out: ControlWriter::new(control_out),
            log_out,
            log_err,
        }
    }

    /// Drive the whole lifecycle; returns the process exit code.
    pub fn run(mut self) -> i32 {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = writeln!(self.log_err, "Cannot start runtime: {err}");
                return 1;
            }
        };

        runtime.block_on(async {
            let mut action = match self.initialize().await {
                Ok(action) => action,
                Err(err) => return self.fail_startup(&err),
            };
            self.serve(&mut action).await
        })
    }

    async fn initialize(&mut self) -> Result<ActionRuntime, StartupError> {
        if self.config.preloaded {
            self.init_preloaded()
        } else {
            self.init_from_message().await
        }
    }

    /// Init-message path: ack, read and apply the action description, bind,
    /// ack again. The second ack is what tells the supervisor requests may
    /// flow; it is never written when binding fails.
    async fn init_from_message(&mut self) -> Result<ActionRuntime, StartupError> {
        self.control_out.ack().map_err(StartupError::new)?;

        let message = match self.control_in.next_line() {
            ControlLine::Message(value) => value,
            ControlLine::Malformed { error, .. } => {
                return Err(StartupError::new(format!("invalid init message: {error}")));
            }
            ControlLine::Eof => {
                return Err(StartupError::new("no init message before end of input"));
            }
        };
        let payload = InitPayload::from_value(message).map_err(StartupError::new)?;

        self.env.merge_init_env(&payload.env);
        install_payload(&self.workdir, &payload)?;

        let mut action = if payload.binary {
            ActionRuntime::for_module(&self.workdir, &payload.main)?
        } else {
            ActionRuntime::for_script()?
        };

        // Merged env must already be visible to the activation script and
        // to the entry module's top level.
        action.set_env_snapshot(&self.env).map_err(StartupError::new)?;

        if payload.binary {
            // Only archives can ship a dependency environment.
            if let Some(script) = locate_activation_script(&self.workdir)? {
                action.activate_virtualenv(&script)?;
            }
            action.bind_module_entry(&payload.main).await?;
        } else {
            action.bind_script_entry(&payload.code, &payload.main)?;
        }

        self.control_out.ack().map_err(StartupError::new)?;
        stdio::debugf!("harness", "initialized entry '{}'", payload.main);
        Ok(action)
    }

    /// Preloaded path: the entry module is already in the working directory
    /// and there is no init phase. The ready ack comes after a successful
    /// bind, and only when the supervisor asked for one.
    fn init_preloaded(&mut self) -> Result<ActionRuntime, StartupError> {
        let entry_path = self.workdir.join(ENTRY_FILE);
        let source = std::fs::read_to_string(&entry_path).map_err(|err| {
            StartupError::new(format!(
                "Failed to read entry module '{}': {err}",
                entry_path.display()
            ))
        })?;

        let mut action = ActionRuntime::for_script()?;
        action.set_env_snapshot(&self.env).map_err(StartupError::new)?;

        if let Some(script) = locate_activation_script(&self.workdir)? {
            action.activate_virtualenv(&script)?;
        }

        action.bind_script_entry(&source, PRELOADED_ENTRY)?;

        if self.env.is_set("__OW_WAIT_FOR_ACK") {
            self.control_out.ack().map_err(StartupError::new)?;
        }
        stdio::debug("harness", "initialized preloaded entry");
        Ok(action)
    }

    /// Fatal startup failure: diagnostic on the error log stream, the fixed
    /// Result on the control channel (never the diagnostic itself), one
    /// sentinel pair, exit 1.
    fn fail_startup(&mut self, err: &StartupError) -> i32 {
        let _ = writeln!(self.log_err, "{}", err.diagnostic());
        let _ = self.control_out.write_value(&startup_failure_result());
        let _ = emit_frame_pair(&mut self.log_out, &mut self.log_err);
        1
    }

    /// Serve until the control input ends. The loop survives every
    /// per-request failure; only a dead control channel ends the process
    /// early.
    async fn serve(&mut self, action: &mut ActionRuntime) -> i32 {
        loop {
            let result = match self.control_in.next_line() {
                ControlLine::Eof => {
                    tracing::debug!("control input closed, shutting down");
                    return 0;
                }
                ControlLine::Malformed { error, .. } => {
                    let _ = writeln!(self.log_err, "Invalid request: {error}");
                    serde_json::json!({ "error": format!("Invalid request: {error}") })
                }
                ControlLine::Message(message) => self.handle_request(action, message).await,
            };

            if let Err(err) = self.control_out.write_value(&result) {
                let _ = writeln!(self.log_err, "{err}");
                return 1;
            }
            if emit_frame_pair(&mut self.log_out, &mut self.log_err).is_err() {
                return 1;
            }
        }
    }

    async fn handle_request(&mut self, action: &mut ActionRuntime, message: Value) -> Value {
        let request = match InvocationRequest::from_value(message) {
            Ok(request) => request,
            Err(err) => {
                let _ = writeln!(self.log_err, "Invalid request: {err}");
                return serde_json::json!({ "error": format!("Invalid request: {err}") });
            }
        };

        request.apply_metadata(&mut self.env);

        match dispatch(action, request.into_payload(), &self.env, &self.config).await {
            Ok(value) => value,
            Err(err) => {
                let _ = writeln!(self.log_err, "{}", err.detail());
                err.to_result()
            }
        }
    }
}
