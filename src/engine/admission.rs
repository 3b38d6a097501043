//! Capacity admission for upload candidates.
//!
//! Candidates are sorted smallest-first and admitted while the running
//! total stays within the remaining volume budget. Smallest-first
//! maximizes the number of files that fit, and makes admission a stable
//! prefix of the sorted list rather than whatever order the filesystem
//! walk produced. The first candidate that does not fit closes admission
//! for the rest of the round.

/// Result of one admission round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Paths admitted for upload this pass, smallest first
    pub admitted: Vec<String>,
    /// Paths excluded this pass for lack of capacity
    pub deferred: Vec<String>,
}

/// Partition `candidates` into admitted and deferred against
/// `budget_bytes` of remaining capacity.
pub fn admit_uploads(mut candidates: Vec<(String, u64)>, budget_bytes: u64) -> Admission {
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut admission = Admission::default();
    let mut total: u64 = 0;
    let mut closed = false;

    for (path, size) in candidates {
        if !closed && total.saturating_add(size) <= budget_bytes {
            total += size;
            admission.admitted.push(path);
        } else {
            closed = true;
            admission.deferred.push(path);
        }
    }

    admission
}
