use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::{ConfigManager, DriveConfig};
use crate::store::{FsStore, ManifestStore};

/// The store the inspection commands operate on: the configured one, or
/// the default location when `init` has not been run yet
fn open_store() -> Result<FsStore> {
    let store_dir = match DriveConfig::load() {
        Ok(config) => config.store_dir,
        Err(_) => ConfigManager::default_store_dir()?,
    };
    Ok(FsStore::open(store_dir)?)
}

/// Print the manifest reference at a feed index (latest when omitted)
pub fn handle_feed_get(index: Option<u64>) -> Result<()> {
    let store = open_store()?;

    match index {
        Some(index) => {
            let version = store
                .read_feed_entry(index)
                .with_context(|| format!("Failed to read feed entry {index}"))?;
            println!("feed@{index} → {version}");
        }
        None => {
            let feed = store.read_feed()?;
            match (feed.current_index, feed.version) {
                (Some(index), Some(version)) => println!("feed@latest (index {index}) → {version}"),
                _ => println!("feed@latest → no feed entry yet"),
            }
        }
    }

    Ok(())
}

/// List all paths under a manifest version
pub fn handle_manifest_ls(version: &str) -> Result<()> {
    let store = open_store()?;
    let entries = store
        .list_manifest(version)
        .with_context(|| format!("Failed to list manifest {version}"))?;

    if entries.is_empty() {
        println!("Manifest {version} is empty.");
    } else {
        println!("Files under manifest {version}:");
        for path in entries.keys() {
            println!("  • {path}");
        }
    }

    Ok(())
}

/// Show the active volume and its utilization
pub fn handle_volume_show() -> Result<()> {
    let store = open_store()?;
    let volume = store.volume()?;
    let used = store.used_bytes()?;

    println!("{}", "Storage volume".bold());
    println!("  id:        {}", volume.id);
    println!("  label:     {}", volume.label);
    println!("  created:   {}", volume.created_at.to_rfc3339());
    println!("  capacity:  {} bytes", volume.capacity_bytes);
    println!("  used:      {used} bytes");
    println!(
        "  remaining: {} bytes",
        volume.capacity_bytes.saturating_sub(used)
    );

    Ok(())
}

/// Create a volume at the configured store location
pub fn handle_volume_create(capacity: u64) -> Result<()> {
    let store_dir = match DriveConfig::load() {
        Ok(config) => config.store_dir,
        Err(_) => ConfigManager::default_store_dir()?,
    };
    let store = FsStore::create_volume(store_dir, "drive-sync-volume", capacity)?;
    let volume = store.volume()?;
    println!(
        "{} volume {} created with {} bytes capacity",
        "✓".green(),
        volume.id,
        volume.capacity_bytes
    );
    Ok(())
}

/// Grow the active volume
pub fn handle_volume_top_up(extra: u64) -> Result<()> {
    let store = open_store()?;
    let volume = store.top_up(extra)?;
    println!(
        "{} volume {} capacity is now {} bytes",
        "✓".green(),
        volume.id,
        volume.capacity_bytes
    );
    Ok(())
}
