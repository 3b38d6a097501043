//! End-to-end sync passes against a filesystem store in a temp dir.

use std::fs;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use drive_sync::engine::{run_sync_pass, CancelFlag, SyncContext, SyncReport};
use drive_sync::snapshot::SnapshotStore;
use drive_sync::store::{FsStore, ManifestStore};

struct Fixture {
    _tmp: TempDir,
    store: FsStore,
    snapshots: SnapshotStore,
    local_dir: PathBuf,
}

fn fixture_with_capacity(capacity: u64) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let local_dir = tmp.path().join("data");
    fs::create_dir_all(&local_dir).unwrap();
    let store = FsStore::create_volume(tmp.path().join("store"), "test", capacity).unwrap();
    let snapshots = SnapshotStore::new(tmp.path().join("state.json"));
    Fixture {
        _tmp: tmp,
        store,
        snapshots,
        local_dir,
    }
}

fn fixture() -> Fixture {
    fixture_with_capacity(1 << 20)
}

impl Fixture {
    fn run(&self) -> SyncReport {
        let ctx = SyncContext {
            store: &self.store,
            snapshots: &self.snapshots,
            local_dir: &self.local_dir,
            excluded: vec![],
            cancel: CancelFlag::new(),
        };
        run_sync_pass(&ctx).unwrap()
    }

    fn write_local(&self, rel: &str, contents: &[u8]) {
        let path = self.local_dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn read_local(&self, rel: &str) -> Vec<u8> {
        fs::read(self.local_dir.join(rel)).unwrap()
    }

    /// Mutate the published manifest the way a second client would: open
    /// the current version, stage edits, commit, publish at the next index
    fn publish_remote(&self, edits: &[(&str, Option<&[u8]>)]) {
        let feed = self.store.read_feed().unwrap();
        let mut tree = self.store.open_tree(feed.version.as_deref()).unwrap();
        for (path, bytes) in edits {
            match bytes {
                Some(bytes) => self.store.stage_upsert(&mut tree, path, bytes).unwrap(),
                None => self.store.stage_remove(&mut tree, path).unwrap(),
            }
        }
        let version = self.store.commit_manifest(&tree).unwrap();
        self.store.write_feed(&version, feed.next_index).unwrap();
    }

    fn remote_listing(&self) -> Vec<String> {
        let feed = self.store.read_feed().unwrap();
        match feed.version {
            Some(version) => self
                .store
                .list_manifest(&version)
                .unwrap()
                .into_keys()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Shift the recorded last-sync pivot so conflict direction is
    /// deterministic regardless of filesystem timestamp granularity
    fn shift_last_sync(&self, minutes: i64) {
        let mut snapshot = self.snapshots.load().unwrap();
        let last = snapshot.last_sync.unwrap_or_else(Utc::now);
        snapshot.last_sync = Some(last + Duration::minutes(minutes));
        self.snapshots.save(&snapshot).unwrap();
    }
}

#[test]
fn first_pass_uploads_and_publishes_at_index_zero() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");

    let report = fx.run();

    assert_eq!(report.added, 1);
    assert_eq!(report.published_index, Some(0));
    assert!(report.manifest.is_some());
    assert_eq!(fx.remote_listing(), vec!["a.txt".to_string()]);

    let feed = fx.store.read_feed().unwrap();
    assert_eq!(feed.current_index, Some(0));
}

#[test]
fn second_pass_without_changes_is_a_noop() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.run();

    let report = fx.run();

    assert!(report.is_noop());
    assert!(report.published_index.is_none());
    // Nothing new on the feed
    assert_eq!(fx.store.read_feed().unwrap().current_index, Some(0));
}

#[test]
fn noop_pass_still_refreshes_the_snapshot_timestamp() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.run();
    let first_sync = fx.snapshots.load().unwrap().last_sync.unwrap();

    fx.run();

    let second_sync = fx.snapshots.load().unwrap().last_sync.unwrap();
    assert!(second_sync >= first_sync);
    let snapshot = fx.snapshots.load().unwrap();
    assert!(snapshot.last_local_files.contains("a.txt"));
    assert!(snapshot.last_remote_files.contains("a.txt"));
}

#[test]
fn brand_new_remote_file_is_pulled_byte_identical() {
    let fx = fixture();
    fx.publish_remote(&[("b.txt", Some(b"remote bytes"))]);

    let report = fx.run();

    assert_eq!(report.pulled, 1);
    assert_eq!(fx.read_local("b.txt"), b"remote bytes");
    // A pure pull changes no remote content: nothing published
    assert!(report.published_index.is_none());
    assert_eq!(fx.store.read_feed().unwrap().current_index, Some(0));
}

#[test]
fn pull_creates_parent_directories() {
    let fx = fixture();
    fx.publish_remote(&[("nested/dir/c.txt", Some(b"deep"))]);

    let report = fx.run();

    assert_eq!(report.pulled, 1);
    assert_eq!(fx.read_local("nested/dir/c.txt"), b"deep");
}

#[test]
fn local_deletion_propagates_to_the_remote() {
    let fx = fixture();
    fx.write_local("a.txt", b"a");
    fx.write_local("b.txt", b"b");
    fx.run();

    fs::remove_file(fx.local_dir.join("b.txt")).unwrap();
    let report = fx.run();

    assert_eq!(report.deleted_remote, 1);
    assert_eq!(report.published_index, Some(1));
    assert_eq!(fx.remote_listing(), vec!["a.txt".to_string()]);
}

#[test]
fn remote_deletion_propagates_locally_without_a_publish() {
    let fx = fixture();
    fx.write_local("a.txt", b"a");
    fx.write_local("b.txt", b"b");
    fx.run();

    fx.publish_remote(&[("b.txt", None)]);
    let report = fx.run();

    assert_eq!(report.deleted_local, 1);
    assert!(!fx.local_dir.join("b.txt").exists());
    assert!(fx.local_dir.join("a.txt").exists());
    // Only local state changed; the manifest the remote published stands
    assert!(report.published_index.is_none());
}

#[test]
fn conflict_with_local_edit_after_last_sync_uploads() {
    let fx = fixture();
    fx.write_local("c.txt", b"v1");
    fx.run();

    fx.publish_remote(&[("c.txt", Some(b"remote v2"))]);
    fx.write_local("c.txt", b"local v2");
    // Local mtime is clearly after the pivot
    fx.shift_last_sync(-60);

    let report = fx.run();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.pulled, 0);
    let feed = fx.store.read_feed().unwrap();
    assert_eq!(
        fx.store
            .download_file(feed.version.as_deref().unwrap(), "c.txt")
            .unwrap(),
        b"local v2"
    );
}

#[test]
fn conflict_with_untouched_local_file_pulls() {
    let fx = fixture();
    fx.write_local("c.txt", b"v1");
    fx.run();

    fx.publish_remote(&[("c.txt", Some(b"remote v2"))]);
    // Local mtime is clearly before the pivot
    fx.shift_last_sync(60);

    let report = fx.run();

    assert_eq!(report.pulled, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(fx.read_local("c.txt"), b"remote v2");
}

#[test]
fn capacity_shortage_defers_the_large_file() {
    let fx = fixture_with_capacity(200);
    fx.write_local("small.txt", &[b'a'; 10]);
    fx.write_local("big.bin", &[b'b'; 1000]);

    let report = fx.run();

    assert_eq!(report.added, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.published_index, Some(0));
    assert_eq!(fx.remote_listing(), vec!["small.txt".to_string()]);

    let snapshot = fx.snapshots.load().unwrap();
    assert!(snapshot.deferred_files.contains("big.bin"));

    // Still there, still deferred, still not deleted on the next pass
    let report = fx.run();
    assert!(report.is_noop());
    assert_eq!(report.deferred, 1);
    assert!(fx.local_dir.join("big.bin").exists());
}

#[test]
fn topping_up_capacity_admits_the_deferred_file() {
    let fx = fixture_with_capacity(200);
    fx.write_local("small.txt", &[b'a'; 10]);
    fx.write_local("big.bin", &[b'b'; 1000]);
    fx.run();

    fx.store.top_up(5000).unwrap();
    let report = fx.run();

    assert_eq!(report.added, 1);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.published_index, Some(1));
    let mut listing = fx.remote_listing();
    listing.sort();
    assert_eq!(listing, vec!["big.bin".to_string(), "small.txt".to_string()]);
    assert!(fx
        .snapshots
        .load()
        .unwrap()
        .deferred_files
        .is_empty());
}

#[test]
fn deferred_file_is_never_treated_as_a_remote_deletion() {
    let fx = fixture();
    fx.write_local("big.bin", b"payload");

    // A snapshot claiming the file was known on both sides but deferred:
    // absence from the (empty) remote must read as "still waiting", not
    // "deleted remotely"
    let mut snapshot = fx.snapshots.load().unwrap();
    snapshot.last_local_files.insert("big.bin".to_string());
    snapshot.last_remote_files.insert("big.bin".to_string());
    snapshot.deferred_files.insert("big.bin".to_string());
    snapshot.last_sync = Some(Utc::now());
    fx.snapshots.save(&snapshot).unwrap();

    let report = fx.run();

    assert_eq!(report.deleted_local, 0);
    assert!(fx.local_dir.join("big.bin").exists());
    assert_eq!(report.added, 1);
    assert_eq!(fx.remote_listing(), vec!["big.bin".to_string()]);
}

#[test]
fn unreadable_manifest_with_unchanged_local_files_recovers() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.run();

    // Blow away the object store; the feed still points at the manifest
    fs::remove_dir_all(fx.store.root().join("objects")).unwrap();

    let report = fx.run();

    // Nothing changed locally, so the pass degrades to a snapshot refresh
    assert!(report.is_noop());
    assert!(report.published_index.is_none());
    let snapshot = fx.snapshots.load().unwrap();
    assert!(snapshot.last_remote_files.contains("a.txt"));
}

#[test]
fn unreadable_manifest_with_changed_local_files_forces_reupload() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.run();

    fs::remove_dir_all(fx.store.root().join("objects")).unwrap();
    fx.write_local("c.txt", b"new");

    let report = fx.run();

    // Remote treated as empty: everything local re-uploads
    assert_eq!(report.added, 2);
    assert_eq!(report.published_index, Some(1));
    let mut listing = fx.remote_listing();
    listing.sort();
    assert_eq!(listing, vec!["a.txt".to_string(), "c.txt".to_string()]);
}

#[test]
fn cancelled_pass_stops_and_preserves_the_snapshot() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.run();
    let before = fx.snapshots.load().unwrap().last_sync;

    fx.write_local("b.txt", b"bar");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let ctx = SyncContext {
        store: &fx.store,
        snapshots: &fx.snapshots,
        local_dir: &fx.local_dir,
        excluded: vec![],
        cancel,
    };

    assert!(run_sync_pass(&ctx).is_err());
    assert_eq!(fx.snapshots.load().unwrap().last_sync, before);
}

#[test]
fn missing_local_directory_fails_before_touching_the_store() {
    let fx = fixture();
    let missing = fx.local_dir.join("nope");
    let ctx = SyncContext {
        store: &fx.store,
        snapshots: &fx.snapshots,
        local_dir: &missing,
        excluded: vec![],
        cancel: CancelFlag::new(),
    };

    assert!(run_sync_pass(&ctx).is_err());
    assert!(fx.store.read_feed().unwrap().version.is_none());
}

#[test]
fn artifacts_under_the_sync_root_are_not_synced() {
    let fx = fixture();
    fx.write_local("a.txt", b"foo");
    fx.write_local("internal/state.json", b"{}");

    let ctx = SyncContext {
        store: &fx.store,
        snapshots: &fx.snapshots,
        local_dir: &fx.local_dir,
        excluded: vec![fx.local_dir.join("internal")],
        cancel: CancelFlag::new(),
    };
    let report = run_sync_pass(&ctx).unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(fx.remote_listing(), vec!["a.txt".to_string()]);
}
