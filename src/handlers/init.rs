use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::config::{ConfigManager, DriveConfig};
use crate::snapshot::SnapshotStore;
use crate::store::FsStore;

/// Default capacity for a volume created by `init` (1 GiB)
const DEFAULT_VOLUME_CAPACITY_BYTES: u64 = 1 << 30;

const VOLUME_LABEL: &str = "drive-sync-volume";

/// Initialize drive-sync for a local directory
///
/// Validates the directory, writes the config, clears the snapshot state,
/// and makes sure a storage volume exists, creating one when absent.
pub fn handle_init(local_dir: &Path, capacity: Option<u64>) -> Result<()> {
    let resolved = fs::canonicalize(local_dir).with_context(|| {
        format!("'{}' is invalid or not accessible", local_dir.display())
    })?;
    if !resolved.is_dir() {
        bail!("'{}' is not a directory", local_dir.display());
    }

    let config_path = ConfigManager::config_file_path()?;
    if config_path.exists() {
        if atty::is(atty::Stream::Stdin) {
            let overwrite = inquire::Confirm::new(
                "drive-sync is already initialized. Overwrite the configuration?",
            )
            .with_default(false)
            .prompt()
            .context("Failed to read confirmation")?;
            if !overwrite {
                println!("Init cancelled.");
                return Ok(());
            }
        } else {
            log::warn!("overwriting existing configuration at {}", config_path.display());
        }
    }

    let store_dir = ConfigManager::default_store_dir()?;
    let config = DriveConfig::new(resolved.clone(), store_dir.clone());
    config.save()?;

    SnapshotStore::new(ConfigManager::state_file_path()?).reset()?;

    println!(
        "{} configuration saved to {}, state cleared",
        "✓".green(),
        config_path.display()
    );

    let capacity = capacity.unwrap_or(DEFAULT_VOLUME_CAPACITY_BYTES);
    let store = FsStore::open_or_create(store_dir, VOLUME_LABEL, capacity)
        .context("Failed to open or create the storage volume")?;
    let volume = store.volume()?;
    println!(
        "{} volume ready: {} ({} bytes capacity)",
        "✓".green(),
        volume.id,
        volume.capacity_bytes
    );
    println!(
        "\nSyncing {} — run {} to perform the first upload",
        resolved.display().to_string().cyan(),
        "drive-sync sync".bold()
    );

    Ok(())
}
