//! Log-frame sentinel emission.
//!
//! The supervisor demultiplexes action logs by scanning stdout and stderr
//! for an exact sentinel line after each activation. The sentinel closes the
//! frame, so it must go out only after the Result line has been flushed on
//! the control channel.

use std::io::Write;

/// The exact sentinel line. The supervisor matches it literally.
pub const LOG_SENTINEL: &str = "XXX_THE_END_OF_A_WHISK_ACTIVATION_XXX";

/// Close the current activation's frame on one log stream.
pub fn emit_frame(stream: &mut impl Write) -> Result<(), String> {
    writeln!(stream, "{LOG_SENTINEL}")
        .and_then(|_| stream.flush())
        .map_err(|err| format!("log frame write failed: {err}"))
}

/// Close the frame on both log streams, stdout first.
pub fn emit_frame_pair(out: &mut impl Write, err: &mut impl Write) -> Result<(), String> {
    emit_frame(out)?;
    emit_frame(err)
}
