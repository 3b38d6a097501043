//! Command handler modules
//!
//! Thin glue between the CLI and the engine: each handler assembles the
//! runtime (config, store, snapshot store), delegates, and renders the
//! result for humans.

pub mod config;
pub mod init;
pub mod inspect;
pub mod status;
pub mod sync;

pub use config::{handle_config_get, handle_config_set};
pub use init::handle_init;
pub use inspect::{handle_feed_get, handle_manifest_ls, handle_volume_create, handle_volume_show, handle_volume_top_up};
pub use status::handle_status;
pub use sync::{handle_schedule, handle_sync, handle_watch};

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{ConfigManager, DriveConfig};
use crate::engine::{CancelFlag, SyncContext};
use crate::snapshot::SnapshotStore;
use crate::store::FsStore;

/// Loaded configuration plus the collaborators a pass needs
pub struct Runtime {
    pub config: DriveConfig,
    pub store: FsStore,
    pub snapshots: SnapshotStore,
}

impl Runtime {
    /// Load config and open the store; fails with actionable messages when
    /// `init` has not been run
    pub fn load() -> Result<Self> {
        let config = DriveConfig::load()?;
        let store = FsStore::open(config.store_dir.clone())?;
        let snapshots = SnapshotStore::new(ConfigManager::state_file_path()?);
        Ok(Runtime {
            config,
            store,
            snapshots,
        })
    }

    /// Build a sync context borrowing this runtime
    pub fn context(&self, cancel: CancelFlag) -> Result<SyncContext<'_>> {
        Ok(SyncContext {
            store: &self.store,
            snapshots: &self.snapshots,
            local_dir: &self.config.local_dir,
            excluded: self.excluded_paths()?,
            cancel,
        })
    }

    /// The tool's own artifacts, excluded from listings and watch events
    /// in case they live under the synced directory
    fn excluded_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(vec![
            ConfigManager::config_dir()?,
            self.config.store_dir.clone(),
        ])
    }
}
