//! Tracing subscriber setup for the binary.
//!
//! Reads `SCHEMA_SEARCH_LOG` as an `EnvFilter` directive
//! (e.g. `SCHEMA_SEARCH_LOG=schema_search_core=debug,info`). Output goes
//! to stderr so `search --json` stays parseable on stdout.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "SCHEMA_SEARCH_LOG";

static INIT: Once = Once::new();

/// Install the global subscriber. Safe to call more than once.
///
/// `verbose` lowers the fallback level from `warn` to `debug`; an explicit
/// `SCHEMA_SEARCH_LOG` always wins.
pub fn init(verbose: bool, json: bool) {
    INIT.call_once(|| {
        let fallback = if verbose { "debug" } else { "warn" };
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

        let text = (!json).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
        });
        let structured = json.then(|| {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
        });

        // Another subscriber may already be installed (e.g. by an embedding host).
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(text)
            .with(structured)
            .try_init();
    });
}
