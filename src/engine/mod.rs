//! The synchronization engine.
//!
//! [`run_sync_pass`] runs exactly one pass to completion or fails loudly:
//! diff the previous snapshot against the current local and remote
//! listings, resolve content conflicts by modification time, admit uploads
//! against the remaining volume capacity, apply the operation sets, commit
//! and publish a new manifest version, and replace the snapshot as the
//! final step. A pass that fails before that final step leaves the
//! previous snapshot untouched, so the next pass recomputes the same
//! diffs.

pub mod admission;
pub mod conflict;
pub mod diff;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use crate::snapshot::{Snapshot, SnapshotStore};
use crate::store::{with_retry, ManifestStore, Reference, StoreError};

use admission::admit_uploads;
use conflict::Winner;
use diff::compute_diff;

/// Attempts and interval for reading a just-published manifest back from
/// an eventually-consistent store
const MANIFEST_READ_ATTEMPTS: u32 = 5;
const MANIFEST_READ_DELAY: Duration = Duration::from_secs(1);

/// Cooperative cancellation signal, checked between operation-set steps.
///
/// Cancelling never rolls anything back: uploaded content is already
/// durable and the manifest working tree is only committed once, at the
/// end, so an interrupted pass simply stops early without a snapshot
/// write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            bail!("sync pass cancelled");
        }
        Ok(())
    }
}

/// Everything a pass needs, passed explicitly — the engine does no
/// ambient lookups.
pub struct SyncContext<'a> {
    pub store: &'a dyn ManifestStore,
    pub snapshots: &'a SnapshotStore,
    pub local_dir: &'a Path,
    /// Absolute path prefixes excluded from the local listing (the tool's
    /// own config/state artifacts)
    pub excluded: Vec<PathBuf>,
    pub cancel: CancelFlag,
}

/// A capacity error that interrupted the upload phase
#[derive(Debug, Clone)]
pub struct CapacityFailure {
    pub path: String,
    pub needed_bytes: u64,
    pub remaining_bytes: u64,
}

/// What one pass did
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub added: usize,
    pub uploaded: usize,
    pub pulled: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    /// Paths still waiting for capacity after this pass
    pub deferred: usize,
    /// Manifest version the directory is in sync with after the pass
    pub manifest: Option<Reference>,
    /// Feed index written this pass, if content changed
    pub published_index: Option<u64>,
    /// Set when a capacity error aborted part of the upload phase
    pub capacity_failure: Option<CapacityFailure>,
}

impl SyncReport {
    /// True when the pass found nothing to do
    pub fn is_noop(&self) -> bool {
        self.added == 0
            && self.uploaded == 0
            && self.pulled == 0
            && self.deleted_local == 0
            && self.deleted_remote == 0
    }
}

/// Recursively list relative file paths under `dir`, skipping anything
/// below one of the `excluded` absolute prefixes. Separators are
/// normalized to `/` so listings compare equal across platforms.
pub fn list_local_files(dir: &Path, excluded: &[PathBuf]) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|ex| entry.path().starts_with(ex)));

    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("Failed to relativize {}", entry.path().display()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(rel);
    }

    Ok(files)
}

/// Run one synchronization pass.
pub fn run_sync_pass(ctx: &SyncContext) -> Result<SyncReport> {
    if !ctx.local_dir.is_dir() {
        bail!(
            "local directory '{}' is invalid or not accessible",
            ctx.local_dir.display()
        );
    }

    let snapshot = ctx.snapshots.load()?;
    let local_now = list_local_files(ctx.local_dir, &ctx.excluded)?;

    let feed = ctx
        .store
        .read_feed()
        .context("Failed to read the drive feed")?;

    // A manifest listing that fails to load is recovered from the snapshot
    // when nothing changed locally; otherwise the remote is treated as
    // empty and everything re-uploads.
    let mut listed_version: Option<&str> = None;
    let remote_now: BTreeMap<String, Reference> = match feed.version.as_deref() {
        None => BTreeMap::new(),
        Some(version) => {
            match with_retry(MANIFEST_READ_ATTEMPTS, MANIFEST_READ_DELAY, || {
                ctx.store.list_manifest(version)
            }) {
                Ok(entries) => {
                    listed_version = Some(version);
                    entries
                }
                Err(err @ (StoreError::NotFound(_) | StoreError::InvalidReference(_))) => {
                    if local_now == snapshot.last_local_files {
                        log::warn!(
                            "manifest {version} unreadable ({err}); local files unchanged, \
                             assuming the remote still matches the last snapshot"
                        );
                        snapshot
                            .last_remote_files
                            .iter()
                            .map(|p| (p.clone(), String::new()))
                            .collect()
                    } else {
                        log::warn!(
                            "manifest {version} unreadable ({err}) and local files changed; \
                             treating the remote as empty, a full re-upload will follow"
                        );
                        BTreeMap::new()
                    }
                }
                Err(err) => {
                    return Err(err).context("Failed to list the remote manifest");
                }
            }
        }
    };
    let remote_paths: BTreeSet<String> = remote_now.keys().cloned().collect();

    ctx.cancel.check()?;

    let diff = compute_diff(
        &snapshot.last_local_files,
        &snapshot.last_remote_files,
        &local_now,
        &remote_paths,
        &snapshot.deferred_files,
    );

    // Conflict resolution: byte-compare every path present on both sides,
    // then route diverging paths by modification time. Skipped when the
    // listing was synthesized from the snapshot (no readable version to
    // download from; by construction nothing changed locally).
    let mut to_upload: BTreeSet<String> = BTreeSet::new();
    let mut to_pull: BTreeSet<String> = diff.to_pull.clone();
    if let Some(version) = listed_version {
        for path in &diff.conflict_candidates {
            let abs = ctx.local_dir.join(path);
            let local_bytes = fs::read(&abs)
                .with_context(|| format!("Failed to read local file: {}", abs.display()))?;
            let remote_bytes = ctx
                .store
                .download_file(version, path)
                .with_context(|| format!("Failed to download '{path}' for comparison"))?;
            if local_bytes == remote_bytes {
                continue;
            }

            let mtime = local_mtime(&abs)?;
            match conflict::resolve(mtime, snapshot.last_sync) {
                Winner::Local => {
                    to_upload.insert(path.clone());
                }
                Winner::Remote => {
                    to_pull.insert(path.clone());
                }
            }
        }
    }

    ctx.cancel.check()?;

    // Admission: gate to_add ∪ to_upload against the remaining capacity
    let budget = ctx
        .store
        .remaining_capacity()
        .context("Failed to query remaining volume capacity")?;
    let mut candidates: Vec<(String, u64)> = Vec::new();
    for path in diff.to_add.iter().chain(to_upload.iter()) {
        let abs = ctx.local_dir.join(path);
        let size = fs::metadata(&abs)
            .with_context(|| format!("Failed to stat local file: {}", abs.display()))?
            .len();
        candidates.push((path.clone(), size));
    }
    let admission = admit_uploads(candidates, budget);
    let admitted: BTreeSet<String> = admission.admitted.iter().cloned().collect();
    let newly_deferred: BTreeSet<String> = admission.deferred.iter().cloned().collect();
    if !newly_deferred.is_empty() {
        log::warn!(
            "{} file(s) deferred: {} bytes of capacity remaining",
            newly_deferred.len(),
            budget
        );
    }

    let to_add: BTreeSet<String> = diff.to_add.intersection(&admitted).cloned().collect();
    let to_upload: BTreeSet<String> = to_upload.intersection(&admitted).cloned().collect();
    // A path waiting for capacity is not a remote deletion
    let to_delete_local: BTreeSet<String> = diff
        .to_delete_local
        .difference(&newly_deferred)
        .cloned()
        .collect();
    let to_delete_remote = diff.to_delete_remote;

    let mut local_final = local_now.clone();
    let mut report = SyncReport {
        deferred: newly_deferred.len(),
        manifest: feed.version.clone(),
        ..SyncReport::default()
    };

    // Steady state: refresh the snapshot, touch nothing else
    if to_add.is_empty()
        && to_upload.is_empty()
        && to_pull.is_empty()
        && to_delete_local.is_empty()
        && to_delete_remote.is_empty()
    {
        let deferred_files =
            prune_deferred(&snapshot.deferred_files, &newly_deferred, &local_final, &BTreeSet::new());
        report.deferred = deferred_files.len();
        save_snapshot(ctx, local_final, remote_paths, deferred_files)?;
        log::info!("no changes detected");
        return Ok(report);
    }

    // Local deletions
    for path in &to_delete_local {
        let abs = ctx.local_dir.join(path);
        match fs::remove_file(&abs) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to delete local file: {}", abs.display()));
            }
        }
        local_final.remove(path);
        log::info!("deleted locally: {path}");
    }

    ctx.cancel.check()?;

    // Pulls
    if !to_pull.is_empty() {
        let Some(version) = listed_version else {
            bail!("cannot pull {} file(s): the remote manifest is unreadable", to_pull.len());
        };
        for path in &to_pull {
            let bytes = ctx
                .store
                .download_file(version, path)
                .with_context(|| format!("Failed to download '{path}'"))?;
            let abs = ctx.local_dir.join(path);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
            fs::write(&abs, &bytes)
                .with_context(|| format!("Failed to write local file: {}", abs.display()))?;
            local_final.insert(path.clone());
            log::info!("pulled: {path}");
        }
        report.pulled = to_pull.len();
    }

    ctx.cancel.check()?;

    // Manifest mutations accumulate in a working tree; the tree is
    // committed once, after all staging.
    let needs_mutation =
        !to_add.is_empty() || !to_upload.is_empty() || !to_delete_remote.is_empty();
    let mut added_ok: BTreeSet<String> = BTreeSet::new();
    let mut uploaded_ok: BTreeSet<String> = BTreeSet::new();

    if needs_mutation {
        let mut tree = ctx
            .store
            .open_tree(listed_version)
            .context("Failed to open the manifest working tree")?;

        'uploads: for (paths, replace) in [(&to_add, false), (&to_upload, true)] {
            for path in paths.iter() {
                let abs = ctx.local_dir.join(path);
                let bytes = match fs::read(&abs) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // A single unreadable file does not block the batch
                        log::warn!("skipping '{path}': {e}");
                        continue;
                    }
                };

                if replace {
                    ctx.store
                        .stage_remove(&mut tree, path)
                        .with_context(|| format!("Failed to replace '{path}'"))?;
                }
                match ctx.store.stage_upsert(&mut tree, path, &bytes) {
                    Ok(()) => {
                        if replace {
                            uploaded_ok.insert(path.clone());
                            log::info!("uploaded: {path}");
                        } else {
                            added_ok.insert(path.clone());
                            log::info!("added: {path}");
                        }
                    }
                    Err(StoreError::CapacityExceeded {
                        path: offending,
                        needed_bytes,
                        remaining_bytes,
                    }) => {
                        log::error!(
                            "capacity exceeded storing '{offending}': {needed_bytes} bytes \
                             needed, {remaining_bytes} remaining; aborting remaining uploads"
                        );
                        report.capacity_failure = Some(CapacityFailure {
                            path: offending,
                            needed_bytes,
                            remaining_bytes,
                        });
                        break 'uploads;
                    }
                    Err(e) => {
                        log::warn!("upload failed for '{path}': {e}");
                    }
                }
            }
        }

        ctx.cancel.check()?;

        for path in &to_delete_remote {
            ctx.store
                .stage_remove(&mut tree, path)
                .with_context(|| format!("Failed to remove '{path}' from the manifest"))?;
            log::info!("deleted remotely: {path}");
        }

        let version = ctx
            .store
            .commit_manifest(&tree)
            .context("Failed to commit the manifest")?;

        // Publish only when manifest content actually changed; adds that
        // were also deleted locally this pass do not count.
        let changed = added_ok.difference(&to_delete_local).next().is_some()
            || !uploaded_ok.is_empty()
            || !to_delete_remote.is_empty();
        if changed {
            ctx.store
                .write_feed(&version, feed.next_index)
                .context("Failed to publish the new manifest version")?;
            report.published_index = Some(feed.next_index);
            log::info!("published manifest {version} at feed index {}", feed.next_index);
        }

        report.manifest = Some(version);
        report.added = added_ok.len();
        report.uploaded = uploaded_ok.len();
        report.deleted_local = to_delete_local.len();
        report.deleted_remote = to_delete_remote.len();

        let last_remote: BTreeSet<String> = tree.paths().map(str::to_string).collect();
        let mut succeeded = added_ok;
        succeeded.extend(uploaded_ok);
        let deferred_files =
            prune_deferred(&snapshot.deferred_files, &newly_deferred, &local_final, &succeeded);
        report.deferred = deferred_files.len();
        save_snapshot(ctx, local_final, last_remote, deferred_files)?;
    } else {
        report.deleted_local = to_delete_local.len();
        let deferred_files =
            prune_deferred(&snapshot.deferred_files, &newly_deferred, &local_final, &BTreeSet::new());
        report.deferred = deferred_files.len();
        save_snapshot(ctx, local_final, remote_paths, deferred_files)?;
    }

    Ok(report)
}

/// Deferred set carried to the next pass: previous deferrals plus this
/// round's, pruned to files that still exist locally and were not
/// uploaded after all.
fn prune_deferred(
    previous: &BTreeSet<String>,
    newly: &BTreeSet<String>,
    local_final: &BTreeSet<String>,
    uploaded: &BTreeSet<String>,
) -> BTreeSet<String> {
    previous
        .union(newly)
        .filter(|p| local_final.contains(*p))
        .filter(|p| !uploaded.contains(*p))
        .cloned()
        .collect()
}

/// The required final step of a successful pass
fn save_snapshot(
    ctx: &SyncContext,
    last_local_files: BTreeSet<String>,
    last_remote_files: BTreeSet<String>,
    deferred_files: BTreeSet<String>,
) -> Result<()> {
    ctx.snapshots.save(&Snapshot {
        last_local_files,
        last_remote_files,
        deferred_files,
        last_sync: Some(Utc::now()),
    })
}

fn local_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified))
}
