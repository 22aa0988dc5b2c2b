//! Command-line entry point.
//!
//! ```bash
//! drf-docs-from-source [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! Generate both output trees below `./build`:
//! ```bash
//! drf-docs-from-source ./myproject -o build
//! ```
//!
//! Only the TypeScript declarations of two applications:
//! ```bash
//! drf-docs-from-source ./myproject --typescript-only -a users,orders
//! ```

use anyhow::Result;
use clap::Parser;
use drf_docs_from_source::cli;
use log::info;

fn main() -> Result<()> {
    // Parse once to read the verbose flag, then validate after the logger is up
    let args_for_verbose = cli::CliArgs::parse();

    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("DRF docs generator starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;
    let result = cli::run(args)?;

    if !result.success {
        log::error!("Generation failed with {} error(s)", result.errors.len());
        std::process::exit(1);
    }

    info!(
        "Generation completed successfully in {:.2}s",
        result.elapsed_seconds
    );
    Ok(())
}
