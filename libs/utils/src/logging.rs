//! Minimal `tracing` wiring. Log level routing and output format selection
//! (the CLI's `--log-level`/`--log-format` flags) are out of scope for this
//! core; this just gives library callers and tests a one-line way to get
//! structured logs on stderr.

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a process-wide `tracing` subscriber reading `RUST_LOG` (default
/// `info`). Safe to call more than once; subsequent calls are no-ops, and a
/// failed install is reported to stderr directly rather than handed back to
/// the caller, since nothing useful can be matched on a logging-setup error.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .context("failed to install global tracing subscriber");
    if let Err(e) = result {
        eprintln!("{e:#}");
    }
}
