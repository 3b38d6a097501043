//! Pure set arithmetic over the three state observations.
//!
//! Given what the last snapshot recorded, what is on disk now, and what
//! the remote manifest lists now, compute the operation sets for one pass.
//! No I/O happens here; content conflicts are only *named* here
//! (`conflict_candidates`) and resolved later once bytes are compared.

use std::collections::BTreeSet;

/// Operation sets for one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSets {
    /// Local-only paths to add to the manifest
    pub to_add: BTreeSet<String>,

    /// Paths the remote deleted since the last sync; the local copy follows
    pub to_delete_local: BTreeSet<String>,

    /// Paths the user deleted locally; the remote copy is removed
    pub to_delete_remote: BTreeSet<String>,

    /// Brand-new remote paths never seen locally
    pub to_pull: BTreeSet<String>,

    /// Paths present on both sides; divergence is decided by byte
    /// comparison and routed by the conflict resolver
    pub conflict_candidates: BTreeSet<String>,
}

/// Compute the operation sets for one pass.
///
/// `deferred` paths are local files that were skipped for capacity in a
/// previous round. Their absence from the remote does not mean the remote
/// deleted them, so they are exempt from local deletion.
pub fn compute_diff(
    prev_local: &BTreeSet<String>,
    prev_remote: &BTreeSet<String>,
    local_now: &BTreeSet<String>,
    remote_now: &BTreeSet<String>,
    deferred: &BTreeSet<String>,
) -> DiffSets {
    // Remote deleted it: known both sides last time, still here, gone there
    let to_delete_local: BTreeSet<String> = prev_local
        .intersection(local_now)
        .filter(|p| prev_remote.contains(*p))
        .filter(|p| !remote_now.contains(*p))
        .filter(|p| !deferred.contains(*p))
        .cloned()
        .collect();

    let to_add: BTreeSet<String> = local_now
        .iter()
        .filter(|p| !remote_now.contains(*p))
        .filter(|p| !to_delete_local.contains(*p))
        .cloned()
        .collect();

    // User deleted it locally after it had been uploaded from here
    let to_delete_remote: BTreeSet<String> = prev_local
        .iter()
        .filter(|p| remote_now.contains(*p))
        .filter(|p| !local_now.contains(*p))
        .cloned()
        .collect();

    // Never seen locally: pull rather than mistake it for a local deletion
    let to_pull: BTreeSet<String> = remote_now
        .iter()
        .filter(|p| !local_now.contains(*p))
        .filter(|p| !prev_local.contains(*p))
        .cloned()
        .collect();

    let conflict_candidates: BTreeSet<String> =
        local_now.intersection(remote_now).cloned().collect();

    DiffSets {
        to_add,
        to_delete_local,
        to_delete_remote,
        to_pull,
        conflict_candidates,
    }
}
