//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// End-to-end RPC test runner for L1/L2 rollup devnets
#[derive(Parser, Debug)]
#[command(name = "devnet-sim")]
#[command(version = "0.1.0")]
#[command(about = "Bootstrap a rollup devnet and run RPC tests against it")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bootstrap the devnet and run the RPC suite
    Run(RunArgs),

    /// List the tests in the RPC suite
    List(ListArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to the standard locations)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Maximum tests in flight
    #[arg(short = 'n', long)]
    pub concurrent: Option<usize>,

    /// Time each finished test keeps its slot, in milliseconds (0 disables)
    #[arg(long)]
    pub launch_delay_ms: Option<u64>,

    /// Per-test timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only run tests whose name contains this pattern
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(long)]
    pub format: Option<String>,

    /// Contract and genesis artifact directory
    #[arg(short, long)]
    pub artifacts: Option<String>,

    /// Also start an output proposer
    #[arg(long)]
    pub with_proposer: bool,

    /// Save the report to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show test descriptions
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path (defaults to ~/.config/devnet-sim/config.yaml)
        #[arg(short, long)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        file: Option<String>,

        /// Output format (yaml, json)
        #[arg(long, default_value = "yaml")]
        format: String,
    },

    /// Show environment variable overrides
    Env,
}
