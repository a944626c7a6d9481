use anyhow::{Context, Result};
use shared::TimelineConfig;
use std::path::Path;

pub fn load_config(path: &Path) -> Result<TimelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = TimelineConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}
