//! Wire model for the husk action harness.
//!
//! Everything the control channel carries is defined here: the one-time
//! initialization message, per-invocation requests, the activation context
//! derived from environment metadata, the web-event payload rewrite, and the
//! error taxonomy shared by the engine and the run loop. The crate is pure
//! data and parsing; it never touches the process streams itself.

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod init;
pub mod request;
pub mod web;

pub use config::{ContextProfile, HarnessConfig};
pub use context::ActivationContext;
pub use env::EnvStore;
pub use error::{RequestError, StartupError};
pub use init::InitPayload;
pub use request::InvocationRequest;
