//! Conflict resolution for paths that diverged on both sides.
//!
//! The last completed sync is the last point local and remote were known
//! to agree. A local modification at or after that pivot is assumed
//! intentional and wins; a file untouched locally but differing remotely
//! implies an external update and loses. This is last-writer-wins by wall
//! clock, not a merge: two machines editing the same file between syncs
//! race on whichever syncs later.

use chrono::{DateTime, Utc};

/// Which side of a diverged path wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// Local edit takes precedence; the path is uploaded
    Local,
    /// Remote content takes precedence; the path is pulled
    Remote,
}

/// Classify a diverged path by its local modification time.
///
/// A directory that has never synced has no pivot; everything local is
/// then considered an intentional edit.
pub fn resolve(local_mtime: DateTime<Utc>, last_sync: Option<DateTime<Utc>>) -> Winner {
    match last_sync {
        Some(pivot) if local_mtime < pivot => Winner::Remote,
        _ => Winner::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_local_edit_after_sync_wins() {
        let pivot = Utc::now();
        let mtime = pivot + Duration::seconds(5);
        assert_eq!(resolve(mtime, Some(pivot)), Winner::Local);
    }

    #[test]
    fn test_untouched_local_loses_to_remote() {
        let pivot = Utc::now();
        let mtime = pivot - Duration::seconds(5);
        assert_eq!(resolve(mtime, Some(pivot)), Winner::Remote);
    }

    #[test]
    fn test_mtime_exactly_at_pivot_wins_locally() {
        let pivot = Utc::now();
        assert_eq!(resolve(pivot, Some(pivot)), Winner::Local);
    }

    #[test]
    fn test_no_pivot_means_local_wins() {
        let mtime = Utc::now() - Duration::days(365);
        assert_eq!(resolve(mtime, None), Winner::Local);
    }
}
