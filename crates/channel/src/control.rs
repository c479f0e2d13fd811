//! Control-channel reader and writer.

use std::io::{BufRead, Write};

use serde_json::Value;

/// One read from the control input.
#[derive(Debug)]
pub enum ControlLine {
    /// A decoded JSON value.
    Message(Value),
    /// A line that was read but does not decode as JSON. The loop must
    /// survive these.
    Malformed { line: String, error: String },
    /// Input is exhausted; the supervisor hung up.
    Eof,
}

/// Line reader over the control input stream.
pub struct ControlReader<R> {
    input: R,
}

impl<R: BufRead> ControlReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read the next control line. A read error means the supervisor is
    /// gone, which is treated the same as end of input.
    pub fn next_line(&mut self) -> ControlLine {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => ControlLine::Eof,
            Ok(_) => {
                let text = line.trim();
                match serde_json::from_str::<Value>(text) {
                    Ok(value) => ControlLine::Message(value),
                    Err(err) => ControlLine::Malformed {
                        line: text.to_string(),
                        error: err.to_string(),
                    },
                }
            }
        }
    }
}

/// Writer for the control output stream: one JSON value per line, flushed
/// after every write so the supervisor never blocks on a partial line.
pub struct ControlWriter<W> {
    output: W,
}

impl<W: Write> ControlWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Write one value as a single line and flush it.
    pub fn write_value(&mut self, value: &Value) -> Result<(), String> {
        let encoded = serde_json::to_string(value)
            .map_err(|err| format!("cannot encode control value: {err}"))?;
        self.output
            .write_all(encoded.as_bytes())
            .and_then(|_| self.output.write_all(b"\n"))
            .and_then(|_| self.output.flush())
            .map_err(|err| format!("control channel write failed: {err}"))
    }

    /// Write the ready acknowledgement.
    pub fn ack(&mut self) -> Result<(), String> {
        self.write_value(&serde_json::json!({ "ok": true }))
    }
}

/// The control output stream, pre-opened by the supervisor on file
/// descriptor 3 before this process is spawned.
#[cfg(unix)]
pub fn control_output() -> std::fs::File {
    use std::os::unix::io::FromRawFd as _;
    unsafe { std::fs::File::from_raw_fd(3) }
}
