use anyhow::Result;
use chrono::Utc;
use colored::Colorize;

use crate::config::{ConfigManager, DriveConfig};
use crate::snapshot::SnapshotStore;
use crate::store::{FsStore, ManifestStore};

/// Show configuration, last-sync age, and feed position
pub fn handle_status() -> Result<()> {
    let config = DriveConfig::load()?;
    let snapshot = SnapshotStore::new(ConfigManager::state_file_path()?).load()?;

    println!("{}", "Drive Sync Status".bold());
    println!("-----------------");
    println!("local dir:  {}", config.local_dir.display());
    println!("store dir:  {}", config.store_dir.display());
    println!("watch debounce:    {}s", config.watch_debounce_secs);
    println!("schedule interval: {}s", config.schedule_interval_secs);

    match snapshot.last_sync {
        Some(last) => {
            let mins_ago = (Utc::now() - last).num_minutes();
            println!(
                "last sync:  {} ({} minute{} ago)",
                last.to_rfc3339(),
                mins_ago,
                if mins_ago == 1 { "" } else { "s" }
            );
        }
        None => {
            println!(
                "last sync:  {} — run 'drive-sync sync' to perform the first upload",
                "<no sync yet>".yellow()
            );
        }
    }

    println!("tracked files: {} local, {} remote", snapshot.last_local_files.len(), snapshot.last_remote_files.len());
    if !snapshot.deferred_files.is_empty() {
        println!(
            "{} {} file(s) waiting for capacity",
            "!".yellow(),
            snapshot.deferred_files.len()
        );
    }

    match FsStore::open(config.store_dir.clone()) {
        Ok(store) => {
            let feed = store.read_feed()?;
            match (feed.current_index, feed.version) {
                (Some(index), Some(version)) => {
                    println!("feed:       index {index} → {version}");
                }
                _ => println!("feed:       <nothing published yet>"),
            }
            println!(
                "capacity:   {} bytes remaining",
                store.remaining_capacity()?
            );
        }
        Err(e) => {
            println!("store:      {} ({e})", "unavailable".yellow());
        }
    }

    Ok(())
}
