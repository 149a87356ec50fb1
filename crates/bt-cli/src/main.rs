#![forbid(unsafe_code)]

mod args;
mod commands;
mod load;

use std::process;

use anyhow::Result;
use args::{Args, Command};
use clap::Parser;
use commands::{run_check, run_filter, run_report};

fn main() {
    if let Err(e) = run() {
        eprintln!("bannertab: error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &args.command {
        Command::Report(report) => run_report(report, &mut out),
        Command::Filter(filter) => run_filter(filter, &mut out),
        Command::Check(check) => run_check(check, &mut out),
    }
}
