//! Logging initialization for the command-line tool
//!
//! Logs go to stderr so stdout only carries command output.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is not set
fn default_directives() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Install the global `fmt` subscriber, filtered by `RUST_LOG`
pub fn setup_logging() {
    let (filter, defaulted) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new(default_directives()), true),
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    if defaulted {
        tracing::debug!("RUST_LOG set to default: {}", default_directives());
    }
}
