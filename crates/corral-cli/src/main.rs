//! # corral — container runtime CLI
//!
//! Daemon-less Linux container runtime. A single self-re-executing
//! binary: lifecycle commands run as the supervisor, and the hidden
//! `init` subcommand is the re-exec entry point inside the container's
//! fresh namespaces.

#![allow(
    clippy::unnecessary_wraps,
    clippy::needless_pass_by_value,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
