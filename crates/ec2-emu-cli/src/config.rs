use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ec2_emu_core::EmulatorConfig;

/// Load the emulator configuration, or the defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<EmulatorConfig> {
    let Some(path) = path else {
        return Ok(EmulatorConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    EmulatorConfig::from_json(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
