/// CLI argument parsing for the cluster controller entrypoint.
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "certctl")]
#[command(about = "Cluster-resident certificate lifecycle controller", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, short, long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the cluster-resident certificate controller against the
    /// in-process fake resource store (development/demo use only).
    Controller(ControllerArgs),
}

#[derive(Parser, Debug)]
pub struct ControllerArgs {
    /// Number of worker tasks pulling off the rate-limited queue
    #[arg(long, default_value_t = 2)]
    pub workers: usize,

    /// Path to a TOML config file supplying `[controller]`/`[issuers]` sections
    #[arg(long)]
    pub config: Option<String>,
}
