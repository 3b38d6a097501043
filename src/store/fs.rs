//! Filesystem store backend.
//!
//! Content-addressed layout under a root directory:
//!
//! ```text
//! <root>/objects/ab/cd/<sha256-hex>   content blobs (files and manifest documents)
//! <root>/feed/<index>                 published manifest reference per feed index
//! <root>/volume.json                  capacity allocation metadata
//! ```
//!
//! A manifest version is the reference of a JSON path → reference document
//! stored like any other blob. Blobs are written to a temp sibling and
//! renamed into place, and identical content is stored once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use super::{FeedState, ManifestStore, ManifestTree, Reference, StoreError, StoreResult};

const VOLUME_FILE: &str = "volume.json";
const OBJECTS_DIR: &str = "objects";
const FEED_DIR: &str = "feed";

/// Capacity allocation backing a store.
///
/// The analog of a purchased storage allotment: uploads are admitted
/// against `capacity_bytes` and fail with `CapacityExceeded` once the
/// objects directory would outgrow it. `top_up` raises the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: Uuid,
    pub label: String,
    pub capacity_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Filesystem-backed [`ManifestStore`]
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open an existing store. Fails with an actionable message when no
    /// volume has been created at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = FsStore { root: root.into() };
        if !store.volume_path().exists() {
            return Err(StoreError::NotFound(format!(
                "storage volume at {} (run 'drive-sync volume-create' or 'drive-sync init')",
                store.root.display()
            )));
        }
        Ok(store)
    }

    /// Create a store with a fresh volume of the given capacity.
    ///
    /// Fails if a volume already exists at `root`; use [`FsStore::top_up`]
    /// to grow an existing one.
    pub fn create_volume(
        root: impl Into<PathBuf>,
        label: &str,
        capacity_bytes: u64,
    ) -> StoreResult<Self> {
        let store = FsStore { root: root.into() };
        if store.volume_path().exists() {
            return Err(StoreError::Corrupt(format!(
                "volume already exists at {}",
                store.root.display()
            )));
        }

        fs::create_dir_all(store.root.join(OBJECTS_DIR))?;
        fs::create_dir_all(store.root.join(FEED_DIR))?;

        let volume = Volume {
            id: Uuid::new_v4(),
            label: label.to_string(),
            capacity_bytes,
            created_at: Utc::now(),
        };
        store.save_volume(&volume)?;

        log::info!(
            "created volume {} ({} bytes) at {}",
            volume.id,
            volume.capacity_bytes,
            store.root.display()
        );
        Ok(store)
    }

    /// Open the store at `root`, creating a volume with `capacity_bytes`
    /// if none exists yet. Used by `init`.
    pub fn open_or_create(
        root: impl Into<PathBuf>,
        label: &str,
        capacity_bytes: u64,
    ) -> StoreResult<Self> {
        let root = root.into();
        if root.join(VOLUME_FILE).exists() {
            Self::open(root)
        } else {
            Self::create_volume(root, label, capacity_bytes)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the volume metadata
    pub fn volume(&self) -> StoreResult<Volume> {
        let content = fs::read_to_string(self.volume_path())?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("volume metadata: {e}")))
    }

    /// Raise the volume capacity by `extra_bytes`
    pub fn top_up(&self, extra_bytes: u64) -> StoreResult<Volume> {
        let mut volume = self.volume()?;
        volume.capacity_bytes = volume.capacity_bytes.saturating_add(extra_bytes);
        self.save_volume(&volume)?;
        log::info!(
            "volume {} topped up to {} bytes",
            volume.id,
            volume.capacity_bytes
        );
        Ok(volume)
    }

    /// Bytes currently stored under `objects/`
    pub fn used_bytes(&self) -> StoreResult<u64> {
        let objects = self.root.join(OBJECTS_DIR);
        if !objects.exists() {
            return Ok(0);
        }
        let mut total = 0u64;
        for entry in WalkDir::new(&objects) {
            let entry = entry.map_err(|e| {
                StoreError::Corrupt(format!("walking {}: {e}", objects.display()))
            })?;
            if entry.file_type().is_file() {
                total += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(total)
    }

    fn volume_path(&self) -> PathBuf {
        self.root.join(VOLUME_FILE)
    }

    fn save_volume(&self, volume: &Volume) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(volume)
            .map_err(|e| StoreError::Corrupt(format!("volume metadata: {e}")))?;
        fs::write(self.volume_path(), content)?;
        Ok(())
    }

    fn object_path(&self, reference: &str) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(&reference[0..2])
            .join(&reference[2..4])
            .join(reference)
    }

    /// Store a blob, charging the volume, and return its reference.
    ///
    /// Identical content already present is free: the reference is
    /// returned without a second copy or a second capacity charge.
    fn put_object(&self, bytes: &[u8], path_for_error: &str) -> StoreResult<Reference> {
        let reference = hex_digest(bytes);
        let dest = self.object_path(&reference);
        if dest.exists() {
            return Ok(reference);
        }

        let needed = bytes.len() as u64;
        let remaining = self.remaining_capacity()?;
        if needed > remaining {
            return Err(StoreError::CapacityExceeded {
                path: path_for_error.to_string(),
                needed_bytes: needed,
                remaining_bytes: remaining,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = dest.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &dest)?;
        log::trace!("stored object {reference} ({needed} bytes)");
        Ok(reference)
    }

    fn read_object(&self, reference: &str) -> StoreResult<Vec<u8>> {
        if !is_valid_reference(reference) {
            return Err(StoreError::InvalidReference(reference.to_string()));
        }
        let path = self.object_path(reference);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("object {reference}")));
        }
        Ok(fs::read(path)?)
    }

    fn feed_entry_path(&self, index: u64) -> PathBuf {
        self.root.join(FEED_DIR).join(index.to_string())
    }
}

impl ManifestStore for FsStore {
    fn list_manifest(&self, version: &str) -> StoreResult<BTreeMap<String, Reference>> {
        let bytes = self.read_object(version)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| StoreError::InvalidReference(version.to_string()))
    }

    fn download_file(&self, version: &str, path: &str) -> StoreResult<Vec<u8>> {
        let entries = self.list_manifest(version)?;
        let reference = entries
            .get(path)
            .ok_or_else(|| StoreError::NotFound(format!("path '{path}' in manifest {version}")))?;
        self.read_object(reference)
    }

    fn open_tree(&self, version: Option<&str>) -> StoreResult<ManifestTree> {
        match version {
            None => Ok(ManifestTree::default()),
            Some(v) => match self.list_manifest(v) {
                Ok(entries) => Ok(ManifestTree { entries }),
                // A stale version must not block forward progress
                Err(StoreError::NotFound(_)) | Err(StoreError::InvalidReference(_)) => {
                    log::warn!("manifest {v} unreadable; starting from an empty tree");
                    Ok(ManifestTree::default())
                }
                Err(e) => Err(e),
            },
        }
    }

    fn stage_upsert(&self, tree: &mut ManifestTree, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let reference = self.put_object(bytes, path)?;
        tree.entries.insert(path.to_string(), reference);
        Ok(())
    }

    fn stage_remove(&self, tree: &mut ManifestTree, path: &str) -> StoreResult<()> {
        tree.entries.remove(path);
        Ok(())
    }

    fn commit_manifest(&self, tree: &ManifestTree) -> StoreResult<Reference> {
        let document = serde_json::to_vec_pretty(&tree.entries)
            .map_err(|e| StoreError::Corrupt(format!("manifest document: {e}")))?;
        self.put_object(&document, "<manifest>")
    }

    fn read_feed(&self) -> StoreResult<FeedState> {
        let feed_dir = self.root.join(FEED_DIR);
        if !feed_dir.exists() {
            return Ok(FeedState::empty());
        }

        let mut current: Option<u64> = None;
        for entry in fs::read_dir(&feed_dir)? {
            let entry = entry?;
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            {
                current = Some(current.map_or(index, |c| c.max(index)));
            }
        }

        match current {
            None => Ok(FeedState::empty()),
            Some(index) => {
                let raw = fs::read_to_string(self.feed_entry_path(index))?;
                let version = raw.trim().to_string();
                if !is_valid_reference(&version) {
                    return Err(StoreError::Corrupt(format!(
                        "feed entry {index} holds an invalid reference"
                    )));
                }
                Ok(FeedState {
                    version: Some(version),
                    current_index: Some(index),
                    next_index: index + 1,
                })
            }
        }
    }

    fn read_feed_entry(&self, index: u64) -> StoreResult<Reference> {
        let path = self.feed_entry_path(index);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("feed entry {index}")));
        }
        let version = fs::read_to_string(path)?.trim().to_string();
        if !is_valid_reference(&version) {
            return Err(StoreError::Corrupt(format!(
                "feed entry {index} holds an invalid reference"
            )));
        }
        Ok(version)
    }

    fn write_feed(&self, version: &str, index: u64) -> StoreResult<()> {
        if !is_valid_reference(version) {
            return Err(StoreError::InvalidReference(version.to_string()));
        }

        let feed = self.read_feed()?;
        let dest = self.feed_entry_path(index);
        if dest.exists() || feed.current_index.is_some_and(|c| index <= c) {
            return Err(StoreError::FeedIndexTaken { index });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = dest.with_extension("tmp");
        fs::write(&tmp, version)?;
        fs::rename(&tmp, &dest)?;
        log::debug!("published manifest {version} at feed index {index}");
        Ok(())
    }

    fn remaining_capacity(&self) -> StoreResult<u64> {
        let volume = self.volume()?;
        let used = self.used_bytes()?;
        Ok(volume.capacity_bytes.saturating_sub(used))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn is_valid_reference(reference: &str) -> bool {
    reference.len() == 64 && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(capacity: u64) -> (TempDir, FsStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::create_volume(dir.path().join("store"), "test", capacity).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_without_volume_fails() {
        let dir = TempDir::new().unwrap();
        let result = FsStore::open(dir.path().join("store"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_create_volume_twice_fails() {
        let (dir, _store) = test_store(1024);
        let result = FsStore::create_volume(dir.path().join("store"), "again", 1024);
        assert!(result.is_err());
    }

    #[test]
    fn test_volume_top_up() {
        let (_dir, store) = test_store(100);
        let volume = store.top_up(900).unwrap();
        assert_eq!(volume.capacity_bytes, 1000);
        assert_eq!(store.remaining_capacity().unwrap(), 1000);
    }

    #[test]
    fn test_object_dedup_charges_once() {
        let (_dir, store) = test_store(1024);
        let mut tree = ManifestTree::default();

        store.stage_upsert(&mut tree, "a.txt", b"same bytes").unwrap();
        let used_once = store.used_bytes().unwrap();

        store.stage_upsert(&mut tree, "b.txt", b"same bytes").unwrap();
        assert_eq!(store.used_bytes().unwrap(), used_once);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_capacity_exceeded_reports_context() {
        let (_dir, store) = test_store(10);
        let mut tree = ManifestTree::default();

        let err = store
            .stage_upsert(&mut tree, "big.bin", &[0u8; 64])
            .unwrap_err();
        match err {
            StoreError::CapacityExceeded {
                path,
                needed_bytes,
                remaining_bytes,
            } => {
                assert_eq!(path, "big.bin");
                assert_eq!(needed_bytes, 64);
                assert_eq!(remaining_bytes, 10);
            }
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
        assert!(!tree.contains("big.bin"));
    }

    #[test]
    fn test_commit_and_list_round_trip() {
        let (_dir, store) = test_store(4096);
        let mut tree = ManifestTree::default();

        store.stage_upsert(&mut tree, "a.txt", b"foo").unwrap();
        store.stage_upsert(&mut tree, "sub/b.txt", b"bar").unwrap();
        let version = store.commit_manifest(&tree).unwrap();

        let listed = store.list_manifest(&version).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains_key("a.txt"));
        assert!(listed.contains_key("sub/b.txt"));

        assert_eq!(store.download_file(&version, "a.txt").unwrap(), b"foo");
        assert_eq!(store.download_file(&version, "sub/b.txt").unwrap(), b"bar");
    }

    #[test]
    fn test_download_missing_path_is_not_found() {
        let (_dir, store) = test_store(4096);
        let tree = ManifestTree::default();
        let version = store.commit_manifest(&tree).unwrap();

        let err = store.download_file(&version, "nope.txt").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_list_manifest_rejects_garbage_reference() {
        let (_dir, store) = test_store(4096);
        assert!(matches!(
            store.list_manifest("not-a-reference"),
            Err(StoreError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_open_tree_falls_back_to_empty_on_stale_version() {
        let (_dir, store) = test_store(4096);
        let stale = "0".repeat(64);
        let tree = store.open_tree(Some(&stale)).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_feed_starts_empty_and_advances() {
        let (_dir, store) = test_store(4096);

        let feed = store.read_feed().unwrap();
        assert!(feed.version.is_none());
        assert!(feed.current_index.is_none());
        assert_eq!(feed.next_index, 0);

        let version = store.commit_manifest(&ManifestTree::default()).unwrap();
        store.write_feed(&version, 0).unwrap();

        let feed = store.read_feed().unwrap();
        assert_eq!(feed.version.as_deref(), Some(version.as_str()));
        assert_eq!(feed.current_index, Some(0));
        assert_eq!(feed.next_index, 1);
    }

    #[test]
    fn test_feed_is_append_only() {
        let (_dir, store) = test_store(4096);
        let version = store.commit_manifest(&ManifestTree::default()).unwrap();

        store.write_feed(&version, 0).unwrap();
        assert!(matches!(
            store.write_feed(&version, 0),
            Err(StoreError::FeedIndexTaken { index: 0 })
        ));
        store.write_feed(&version, 1).unwrap();
        assert_eq!(store.read_feed().unwrap().next_index, 2);
    }
}
