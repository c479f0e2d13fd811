//! The `husk` binary.
//!
//! Stream wiring only: stdin carries control lines in, file descriptor 3
//! carries results out, and the process stdout/stderr are the action's log
//! streams. Everything else lives in the `harness` crate.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harness::Harness;
use protocol::{EnvStore, HarnessConfig};

fn main() {
    // Harness-side tracing goes to the error log stream and stays quiet
    // unless RUST_LOG asks for it; stdout belongs to the action.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = HarnessConfig::from_env();
    let workdir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            stdio::errorf!("husk", "cannot resolve working directory: {}", err);
            std::process::exit(1);
        }
    };

    let exit_code = Harness::new(
        config,
        workdir,
        EnvStore::from_process(),
        std::io::stdin().lock(),
        channel::control_output(),
        std::io::stdout(),
        std::io::stderr(),
    )
    .run();
    std::process::exit(exit_code);
}
