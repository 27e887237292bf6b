//! Waypoint CLI entry point.
//!
//! Binary name: `waypoint`
//!
//! Loads configuration, initializes tracing, then dispatches to the
//! requested command handler.

mod cli;

use clap::Parser;
use waypoint_infra::config::{load_config, load_config_strict, resolve_config_path};

use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // An explicitly named config file must exist and parse; the
    // environment and default locations fall back to defaults.
    let mut config = match &cli.config {
        Some(path) => load_config_strict(path)?,
        None => load_config(&resolve_config_path(None)),
    };

    // Verbosity flags override the configured level
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "info,waypoint_core=debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    if cli.json {
        config.logging.json = true;
    }

    waypoint_observe::tracing_setup::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_continuations = config.repository.max_continuations,
        "waypoint starting"
    );

    let result = match cli.command {
        Commands::Demo { max_continuations } => {
            if let Some(max) = max_continuations {
                config.repository.max_continuations = max;
            }
            cli::demo::run(&config.repository, cli.json)
        }
        Commands::DecodeKey { key } => cli::key::decode(&key, cli.json),
        Commands::Config => cli::config::show(&config, cli.json),
    };

    waypoint_observe::tracing_setup::shutdown_tracing();
    result
}
