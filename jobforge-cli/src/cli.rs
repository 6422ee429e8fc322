//! CLI argument parsing using `clap`.

use clap::Parser;

/// Command-line arguments for `jobforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobforge",
    version,
    about = "Runs declared maintenance job graphs against database and host targets.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (YAML).
    ///
    /// Falls back to `JOBFORGE_CONFIG`, then `/etc/jobforge/config.yaml`.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<String>,

    /// Add debugging output.
    #[arg(short = 'd', long)]
    pub debug: bool,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
