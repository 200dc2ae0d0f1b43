// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Switchboard - routes chat platform messages through an upstream agent.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod agent_client;
mod serve;
mod status;
mod webhook;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchboard_config::model::SwitchboardConfig;

/// Switchboard - routes chat platform messages through an upstream agent.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the queue processor and platform plugins until interrupted.
    Serve,
    /// Show queue counts per status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Also list failed items, oldest first.
        #[arg(long)]
        failed: bool,
    },
    /// Mark every pending item as flushed.
    Flush,
    /// Move a failed item back to pending with a fresh attempt budget.
    Retry {
        /// Queue item id.
        id: i64,
    },
}

fn load_config(path: Option<&PathBuf>) -> SwitchboardConfig {
    let loaded = match path {
        Some(path) => switchboard_config::load_and_validate_path(path),
        None => switchboard_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            switchboard_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, failed }) => status::run_status(&config, json, failed).await,
        Some(Commands::Flush) => status::run_flush(&config).await,
        Some(Commands::Retry { id }) => status::run_retry(&config, id).await,
        None => {
            println!("switchboard: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
