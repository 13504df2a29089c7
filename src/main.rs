//! renpy-distributor - build driver for Ren'Py games
//!
//! Turns a Ren'Py project into distributions by driving the Ren'Py SDK,
//! with progress logging, an optional legacy compile pass and CLI ergonomics.
//!
//! ## Architecture
//!
//! ```text
//! Rust CLI → runner → build::tasks → renpy.py (SDK's bundled Python)
//! ```

mod build;
mod cli;
mod commands;
mod config;
mod error;
mod exec;
mod runner;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Environment variable holding the tracing filter, e.g. `debug`
const LOG_ENV: &str = "RENPY_DISTRIBUTOR_LOG";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::OFF.into())
                .with_env_var(LOG_ENV)
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    cli.execute()
}
