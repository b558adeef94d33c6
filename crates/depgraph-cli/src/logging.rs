//! Subscriber setup for the `depgraph` binary.
//!
//! The core crate only emits `tracing` events; this is the one place a
//! subscriber is installed. Events go to stderr so `depgraph tree` can keep
//! stdout for the JSON document.

use depgraph_core::Config;
use miette::{miette, Result};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `RUST_LOG` (default `warn`) plus our own crates at the verbosity level.
///
/// Targets match by prefix, so `depgraph` covers `depgraph_core` as well.
fn filter(verbosity: u8) -> Result<EnvFilter> {
    let directive = format!("depgraph={}", level(verbosity))
        .parse()
        .map_err(|e| miette!("Invalid log directive: {e}"))?;

    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(directive))
}

/// Install the global subscriber described by `config`.
///
/// With `json_logs`, each event is one JSON line:
/// ```json
/// {"timestamp":"...","level":"INFO","fields":{"message":"...","name":"express"},"target":"..."}
/// ```
pub fn init(config: &Config) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(filter(config.verbosity)?);

    let installed = if config.json_logs {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| miette!("Failed to install log subscriber: {e}"))
}
