//! Embedded V8 execution for husk actions.
//!
//! The engine owns everything between "init payload arrived" and "Result
//! value produced": installing the code into the working directory, loading
//! it into a `deno_core` isolate (classic script or ES module), binding the
//! entry point and capturing its calling shape, and running one invocation
//! at a time against it.

pub mod dispatch;
pub mod isolate;
pub mod loader;
pub mod materialize;

pub use dispatch::{EntryShape, dispatch};
pub use isolate::ActionRuntime;
pub use materialize::{ENTRY_FILE, install_payload, locate_activation_script};
