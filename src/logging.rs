//! `tracing` subscriber setup for the `tsh` binary.
//!
//! Events go to stderr so that command output on stdout stays parseable.
//! The filter is read from `TSH_LOG` (e.g. `TSH_LOG=transcript_harness=debug`)
//! and defaults to `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "TSH_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: tests and embedders may already have a global subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}
