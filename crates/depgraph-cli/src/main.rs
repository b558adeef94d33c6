#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use depgraph_core::Config;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "depgraph")]
#[command(author, version, about = "Full npm dependency trees on demand", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted logs
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// npm registry base URL
        #[arg(long, value_name = "URL")]
        registry: Option<String>,

        /// Maximum registry calls in flight per resolution
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Timeout for a single registry call, in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Path to a JSON config file
        #[arg(long, short = 'c', value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Resolve one package and print its dependency tree
    Tree {
        /// Package name (e.g., "express" or "@types/node")
        name: String,

        /// Version or range to resolve
        #[arg(default_value = "latest")]
        constraint: String,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        /// npm registry base URL
        #[arg(long, value_name = "URL")]
        registry: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),

        Some(Commands::Serve {
            host,
            port,
            registry,
            max_concurrency,
            timeout_ms,
            config,
        }) => {
            let mut config = match config {
                Some(path) => Config::load(&path).into_diagnostic()?,
                None => Config::from_env(),
            };
            if host.is_some() || port.is_some() {
                let host = host.unwrap_or_else(|| config.host.clone());
                let port = port.unwrap_or(config.port);
                config = config.with_listen(host, port);
            }
            if let Some(registry) = registry {
                config = config.with_registry(registry);
            }
            if let Some(max) = max_concurrency {
                config = config.with_max_concurrency(max);
            }
            if let Some(ms) = timeout_ms {
                config = config.with_request_timeout_ms(ms);
            }
            let config = config.with_verbosity(cli.verbose).with_json_logs(cli.json);

            logging::init(&config)?;

            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            runtime.block_on(commands::serve::run(commands::serve::ServeAction { config }))
        }

        Some(Commands::Tree {
            name,
            constraint,
            pretty,
            registry,
        }) => {
            let mut config = Config::from_env()
                .with_verbosity(cli.verbose)
                .with_json_logs(cli.json);
            if let Some(registry) = registry {
                config = config.with_registry(registry);
            }

            logging::init(&config)?;

            commands::tree::run(commands::tree::TreeAction {
                name,
                constraint,
                pretty,
                config,
            })
        }
    }
}
