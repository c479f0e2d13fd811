//! Byte-level plumbing for the action-loop protocol.
//!
//! Two concerns live here, both stream-generic so tests can run against
//! in-memory buffers: the control channel (line-delimited JSON in on stdin,
//! JSON out on fd 3) and the log-frame sentinel that closes each
//! activation's segment on the log streams.

pub mod control;
pub mod frames;

pub use control::{ControlLine, ControlReader, ControlWriter};
#[cfg(unix)]
pub use control::control_output;
pub use frames::{LOG_SENTINEL, emit_frame, emit_frame_pair};
