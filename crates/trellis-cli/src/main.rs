mod cli;
mod pipeline;

use clap::Parser;
use cli::{Cli, Commands};
use pipeline::{compile_file, disasm_file};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Compile { file, output } => compile_file(&file, output),
        Commands::Disasm { file } => disasm_file(&file),
    };

    if let Err(error) = result {
        eprintln!("{}", error);
        process::exit(1);
    }
}
