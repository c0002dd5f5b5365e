// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use feed_relay::cli::{self, RelayArgs, ServeArgs};
use feed_relay::config::LogFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "feed-relay",
    about = "Render a dynamic page, capture its JSON feed, serve it from memory",
    version,
    after_help = "Run 'feed-relay <command> --help' for details on each command."
)]
struct Cli {
    /// Log format (pretty, json)
    #[arg(long, global = true, env = "FEED_RELAY_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the cached feed over HTTP and refresh it in the background
    Serve(ServeArgs),
    /// Render the target page once and print the extracted payload
    Fetch {
        #[command(flatten)]
        relay: RelayArgs,
        /// Pretty-print the payload
        #[arg(long)]
        pretty: bool,
    },
    /// Check that a Chromium binary is available
    Doctor {
        /// Chromium binary to check instead of discovering one
        #[arg(long, env = "FEED_RELAY_CHROMIUM_PATH")]
        chromium_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.log_format, cli.verbose);

    let result = match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config();
            match config.validate() {
                Ok(()) => cli::start::run(config).await,
                Err(e) => Err(e.into()),
            }
        }
        Commands::Fetch { relay, pretty } => {
            let config = relay.into_config();
            match config.validate() {
                Ok(()) => cli::fetch_cmd::run(config, pretty).await,
                Err(e) => Err(e.into()),
            }
        }
        Commands::Doctor { chromium_path } => cli::doctor::run(chromium_path.as_deref()).await,
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        tracing::error!("{e:#}");
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
