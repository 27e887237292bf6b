//! Effective configuration display.

use anyhow::Result;

use waypoint_types::config::WaypointConfig;

pub fn show(config: &WaypointConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
