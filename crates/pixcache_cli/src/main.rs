//! pixcache CLI
//!
//! Loads image sources with the same policy a render cache applies.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(has_failures) => {
            if has_failures {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Fetch {
            sources,
            config,
            origin,
            proxy,
            timeout,
            use_cors,
            allow_taint,
            format,
        } => commands::fetch::run_fetch(commands::fetch::FetchArgs {
            sources,
            config,
            origin,
            proxy,
            timeout,
            use_cors,
            allow_taint,
            format,
        }),
        Commands::Origin { url, origin } => {
            commands::origin::run_origin(&url, origin.as_deref()).map(|_| false)
        }
        Commands::Config { file } => commands::config::run_config(&file).map(|_| false),
    }
}
