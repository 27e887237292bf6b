//! CLI command definitions for the `waypoint` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;
pub mod demo;
pub mod key;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumable flow executions across request/response cycles.
#[derive(Parser)]
#[command(name = "waypoint", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a waypoint.toml config file. Must exist when given; without
    /// it, `WAYPOINT_CONFIG` or `./waypoint.toml` is used if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk a checkout flow through save/load cycles, including the back button.
    Demo {
        /// Override the per-conversation continuation limit.
        #[arg(long)]
        max_continuations: Option<usize>,
    },

    /// Split a flow execution key into its conversation and continuation ids.
    DecodeKey {
        /// Encoded key, e.g. `_c<conversationId>_k<continuationId>`.
        key: String,
    },

    /// Print the effective configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_demo_override() {
        let cli = Cli::try_parse_from(["waypoint", "demo", "--max-continuations", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Demo {
                max_continuations: Some(2)
            }
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["waypoint", "decode-key", "_cx_ky", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::DecodeKey { ref key } if key == "_cx_ky"));
    }

    #[test]
    fn config_flag_is_not_read_from_env() {
        use clap::CommandFactory;
        let command = Cli::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert!(config.get_env().is_none());

        let cli = Cli::try_parse_from(["waypoint", "config"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
