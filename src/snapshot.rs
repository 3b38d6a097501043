use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// What the engine last observed, locally and remotely
///
/// One snapshot exists per synced directory. It is read once at the start
/// of a pass and fully replaced at the end of a successful pass; partial
/// passes leave the previous snapshot untouched so the next pass recomputes
/// the same diffs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Relative paths present locally as of the last successful sync
    #[serde(default)]
    pub last_local_files: BTreeSet<String>,

    /// Relative paths present in the remote manifest as of the last
    /// successful sync
    #[serde(default)]
    pub last_remote_files: BTreeSet<String>,

    /// Paths that exist locally but were excluded from upload for lack of
    /// capacity. A deferred path is never treated as a remote deletion.
    #[serde(default)]
    pub deferred_files: BTreeSet<String>,

    /// When the last pass completed; the conflict-resolution pivot
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Loads and saves the snapshot file
///
/// The save path goes through a `.tmp` sibling and a rename so a crash
/// mid-write can never leave a half-written snapshot for the next pass to
/// read.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        SnapshotStore { path }
    }

    /// Load the snapshot, or an empty default if none has been written yet
    pub fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot: {}", self.path.display()))?;

        let snapshot: Snapshot =
            serde_json::from_str(&content).context("Failed to parse snapshot")?;

        Ok(snapshot)
    }

    /// Replace the snapshot on disk atomically
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create snapshot directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace snapshot: {}", self.path.display()))?;

        Ok(())
    }

    /// Reset the snapshot to its empty default, as `init` does
    pub fn reset(&self) -> Result<()> {
        self.save(&Snapshot::default())
    }
}
