//! CLI argument definitions

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nucleus")]
#[command(about = "Process-identity and namespace model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a nested-namespace scenario and print the id projections
    Simulate(SimulateArgs),

    /// Show the host identity record the root namespace is seeded with
    Hostinfo(HostinfoArgs),

    /// Show version information
    Version,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Namespace nesting depth below the root
    #[arg(long, default_value = "2")]
    pub depth: u32,

    /// Number of tasks to create in the deepest namespace
    #[arg(long, default_value = "3")]
    pub tasks: usize,

    /// Hostname for the deepest namespace's cloned identity
    #[arg(long)]
    pub hostname: Option<String>,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct HostinfoArgs {
    /// Emit the record as JSON
    #[arg(long)]
    pub json: bool,
}
