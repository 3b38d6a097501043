//! Manifest store abstraction layer.
//!
//! The sync engine talks to the remote content-addressed store through the
//! [`ManifestStore`] trait: list a manifest version, download file bytes,
//! stage path mutations against an in-memory working tree, commit the tree
//! to a new immutable version, and read/write the versioned feed pointer.
//! The bundled backend is the filesystem store in [`fs`]; a network-backed
//! client implements the same trait.

mod fs;

pub use fs::{FsStore, Volume};

use std::collections::BTreeMap;
use std::time::Duration;

/// Opaque content reference (lowercase hex digest of the referenced bytes)
pub type Reference = String;

/// Typed errors at the store boundary.
///
/// The engine matches on these: `NotFound`/`InvalidReference` trigger the
/// manifest-recovery heuristic, `CapacityExceeded` aborts the remaining
/// uploads in a pass, everything else is fatal for the pass.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found in store")]
    NotFound(String),

    #[error("invalid manifest reference '{0}'")]
    InvalidReference(String),

    #[error(
        "volume capacity exceeded storing '{path}': {needed_bytes} bytes needed, \
         {remaining_bytes} remaining"
    )]
    CapacityExceeded {
        path: String,
        needed_bytes: u64,
        remaining_bytes: u64,
    },

    #[error("feed index {index} already published")]
    FeedIndexTaken { index: u64 },

    #[error("corrupt store data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// In-memory manifest working tree.
///
/// Mutations accumulate here; nothing is visible to readers until
/// [`ManifestStore::commit_manifest`] materializes the tree as a new
/// version. Uploaded content is already durable in the store when staging
/// succeeds, so a dropped tree costs storage but never corrupts a
/// published version.
#[derive(Debug, Clone, Default)]
pub struct ManifestTree {
    pub(crate) entries: BTreeMap<String, Reference>,
}

impl ManifestTree {
    /// Paths currently present in the working tree
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current state of the versioned feed
#[derive(Debug, Clone)]
pub struct FeedState {
    /// Manifest version at the highest published index, if any
    pub version: Option<Reference>,

    /// Highest published index; `None` when nothing has ever been published
    pub current_index: Option<u64>,

    /// The index the next publish must use
    pub next_index: u64,
}

impl FeedState {
    pub fn empty() -> Self {
        FeedState {
            version: None,
            current_index: None,
            next_index: 0,
        }
    }
}

/// Operations the sync engine consumes from the store.
pub trait ManifestStore: Send + Sync {
    /// Enumerate a manifest version as a path → reference map.
    ///
    /// Fails with [`StoreError::NotFound`] or [`StoreError::InvalidReference`]
    /// when the version is unreadable.
    fn list_manifest(&self, version: &str) -> StoreResult<BTreeMap<String, Reference>>;

    /// Download the bytes stored under `path` in a manifest version.
    fn download_file(&self, version: &str, path: &str) -> StoreResult<Vec<u8>>;

    /// Open a working tree seeded from a manifest version.
    ///
    /// `None`, and any version that no longer loads, both yield an empty
    /// tree; a stale reference must not block forward progress.
    fn open_tree(&self, version: Option<&str>) -> StoreResult<ManifestTree>;

    /// Upload `bytes` and record them under `path` in the working tree.
    ///
    /// Fails with [`StoreError::CapacityExceeded`] when the active volume
    /// cannot hold the content.
    fn stage_upsert(&self, tree: &mut ManifestTree, path: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Remove `path` from the working tree. Removing an absent path is a
    /// no-op.
    fn stage_remove(&self, tree: &mut ManifestTree, path: &str) -> StoreResult<()>;

    /// Materialize the working tree as a new immutable manifest version.
    fn commit_manifest(&self, tree: &ManifestTree) -> StoreResult<Reference>;

    /// Read the feed pointer. An unpublished feed is an empty
    /// [`FeedState`], not an error.
    fn read_feed(&self) -> StoreResult<FeedState>;

    /// Read the manifest reference published at a specific index.
    fn read_feed_entry(&self, index: u64) -> StoreResult<Reference>;

    /// Publish `version` at `index`. The feed is append-only: reusing a
    /// published index fails with [`StoreError::FeedIndexTaken`].
    fn write_feed(&self, version: &str, index: u64) -> StoreResult<()>;

    /// Bytes the active volume can still hold.
    fn remaining_capacity(&self) -> StoreResult<u64>;
}

/// Retry an eventually-consistent store read a bounded number of times.
///
/// Fixed attempt budget, fixed interval; the last error surfaces once the
/// budget is exhausted. Never loops unbounded.
pub fn with_retry<T>(
    attempts: u32,
    delay: Duration,
    mut op: impl FnMut() -> StoreResult<T>,
) -> StoreResult<T> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                log::debug!("store read failed (attempt {attempt}/{attempts}): {err}");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
