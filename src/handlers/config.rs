use anyhow::Result;

use crate::config::DriveConfig;

/// Print one configuration value
pub fn handle_config_get(key: &str) -> Result<()> {
    let config = DriveConfig::load()?;
    println!("{key} = {}", config.get(key)?);
    Ok(())
}

/// Update one configuration value
pub fn handle_config_set(key: &str, value: &str) -> Result<()> {
    let mut config = DriveConfig::load()?;
    config.set(key, value)?;
    config.save()?;
    println!("{key} = {}", config.get(key)?);
    Ok(())
}
