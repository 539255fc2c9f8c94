// Logging setup
//
// Diagnostics go to stderr through tracing; stdout is reserved for the
// progress lines and reports the CLI prints. `RUST_LOG` wins over the
// verbosity flag when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "mat=debug"
    } else {
        "mat=info"
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .try_init();
}
