// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the run and validate subcommands for tributary

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "A dataflow workflow engine for executing JSON step graphs")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a dataflow from a JSON file
    Run {
        #[arg(long, help = "Path to JSON-serialized dataflow")]
        dataflow: PathBuf,

        #[arg(long, default_value_t = 8, help = "Number of queue workers")]
        workers: usize,

        #[arg(
            long,
            default_value_t = 250,
            help = "Run state poll interval in milliseconds"
        )]
        poll_interval: u64,
    },

    /// Validate a dataflow file without executing
    Validate {
        #[arg(long, help = "Path to JSON-serialized dataflow")]
        dataflow: PathBuf,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
