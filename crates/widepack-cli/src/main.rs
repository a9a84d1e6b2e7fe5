//! widepack - package index builder CLI

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use widepack_cli::{Cli, POSITIONAL_ARGS, positional_count, report};
use widepack_core::Packager;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        // A wrong number of positional arguments prints the usage and
        // exits successfully; scripts calling the tool rely on it.
        Err(_) if !POSITIONAL_ARGS.contains(&positional_count(&args)) => {
            println!("{}", Cli::command().render_help());
            return Ok(());
        }
        Err(e) => e.exit(),
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let request = cli.request();
    let report = Packager::new(cli.config())
        .run(&request)
        .with_context(|| format!("Failed to package {}", request.root.display()))?;

    let mut stdout = std::io::stdout().lock();
    if cli.json {
        report::print_json(&report, &mut stdout)?;
    } else {
        report::print_summary(&report, &mut stdout)?;
    }
    Ok(())
}
