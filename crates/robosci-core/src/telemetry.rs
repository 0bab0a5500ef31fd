//! Process-wide tracing setup for RoboSci binaries and batch drivers.
//!
//! Without `RUST_LOG`, only the RoboSci crates log at the requested level;
//! everything else (tokio, dependencies) is held at `warn`. JSON output keeps
//! the enclosing run span on every line so interleaved batch runs can be
//! split apart by suffix.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const ROBOSCI_TARGETS: [&str; 3] = ["robosci_archive", "robosci_core", "robosci_cli"];

/// Default filter level for a `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(ROBOSCI_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.is_ok()
}
