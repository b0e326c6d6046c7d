//! Check-config command implementation.

use std::path::Path;

use colored::Colorize;

use crate::config::{resolve_config_path, Config};
use crate::error::Result;

/// Load and validate the config, then print it with secrets hidden.
///
/// # Errors
///
/// Returns an error if the config is missing, unreadable or invalid.
pub fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let config = Config::load(&path)?;
    config.validate()?;

    if json {
        let output = serde_json::json!({
            "path": path.display().to_string(),
            "valid": true,
            "config": config.redacted(),
        });
        println!("{output}");
        return Ok(());
    }

    println!("{} {}", "Config OK:".green().bold(), path.display());
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}
