//! Command-line interface for the trellis template compiler.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// trellisc - compiles wire-format templates to trellis bytecode
#[derive(Parser)]
#[command(name = "trellisc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit compile diagnostics (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a wire-format template JSON file into a program artifact
    Compile {
        /// Path to the template JSON file
        file: PathBuf,

        /// Output path (defaults to the input with a .program.json suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the disassembly of a compiled program artifact
    Disasm {
        /// Path to the compiled artifact
        file: PathBuf,
    },
}
