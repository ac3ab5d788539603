//! Diagnostic tracing for following a search as it runs.
//!
//! Traces go to stderr and are never part of coplan's product output: the
//! exploration statistics printed on stdout and the solution files written by
//! `io/solution_store` look the same whatever the filter says.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default directive for `-v` repeated `verbosity` times.
///
/// Only coplan's own targets get louder; dependencies stay at `warn`.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,coplan=info",
        2 => "warn,coplan=debug",
        _ => "warn,coplan=trace",
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise the filter comes from the `-v` count.
///
/// ```bash
/// RUST_LOG=coplan::core::expand=debug coplan explore prepare_dinner
/// coplan -vv explore prepare_dinner --mode and_or
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .compact(),
        )
        .init();
}
