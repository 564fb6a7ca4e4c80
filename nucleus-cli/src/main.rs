//! Nucleus CLI
//!
//! A small driver over the process-identity model: builds namespace
//! hierarchies, creates simulated tasks, and prints how their ids project
//! through each level.

use clap::Parser;
use std::process;
use tracing::Level;

mod cli;
mod hostinfo;
mod simulate;

use cli::{Cli, Commands};

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Reports go to stdout; keep logs on stderr so `--json` stays parseable
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute the command
    let result = match cli.command {
        Commands::Simulate(args) => simulate::execute(&args),
        Commands::Hostinfo(args) => hostinfo::execute(&args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("❌ Error: {e}");
        process::exit(1);
    }
}

fn print_version() {
    println!("🦀 Nucleus");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Edition: Rust 2024");
    println!();
    println!("A userspace model of:");
    println!("  • Pid allocation with namespace-relative numbering");
    println!("  • Pid / user / UTS namespace cloning");
    println!("  • Grace-period deferred reclamation");
}
