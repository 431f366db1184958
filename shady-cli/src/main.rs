//! shady: forward modified file paths to a hot-reload client over TCP.
//!
//! # Usage
//!
//! ```text
//! shady serve [--preset hot-reload|one-shot] [--config FILE] [--listen ADDR] [--watch DIR] [--recursive]
//! shady config [same flags] [--json|--yaml]
//! shady greet <name>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCmdArgs, greet::GreetArgs, serve::ServeArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "shady",
    version,
    about = "Watch a directory and stream modified file paths to a TCP client",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for a client and forward write events from the watched directory.
    Serve(ServeArgs),

    /// Print the resolved configuration without starting anything.
    Config(ConfigCmdArgs),

    /// Print a greeting (diagnostic).
    Greet(GreetArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Config(args) => args.run(),
        Commands::Greet(args) => args.run(),
    }
}
