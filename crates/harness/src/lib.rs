//! Process lifecycle for the action harness.
//!
//! One `Harness` per process: acknowledge, initialize the action (from an
//! init message or a preloaded image), then serve invocation requests until
//! the control input ends. All streams are injected so the whole lifecycle
//! runs against in-memory buffers in tests.

pub mod lifecycle;

pub use lifecycle::Harness;
