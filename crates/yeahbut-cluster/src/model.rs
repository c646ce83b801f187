//! Core identifiers and records shared by the partition store and the
//! aggregation engine.

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Stable account identifier, owned by the account collaborator.
pub type UserId = u64;

/// Post identifier, owned by the content collaborator.
pub type PostId = u64;

/// Opinion cluster identifier in `[0, cluster_count)`.
pub type ClusterId = u32;

/// Longest term accepted by relevance queries, in bytes.
pub const MAX_TERM_LEN: usize = 64;

// ─────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────

/// One installed partition of the user base.
///
/// `epoch` counts swaps since the store was built and only ever grows.
/// The slot a generation lives in is `epoch & 1`, so two consecutive
/// epochs always occupy different slots while epochs two apart reuse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation {
    pub epoch: u64,
}

impl Generation {
    pub const INITIAL: Generation = Generation { epoch: 0 };

    /// Slot index (`0` or `1`) this generation reads from.
    pub fn slot(self) -> usize {
        (self.epoch & 1) as usize
    }

    /// Slot that is *not* serving reads while this generation is active.
    pub fn staging_slot(self) -> usize {
        1 - self.slot()
    }

    pub fn next(self) -> Generation {
        Generation { epoch: self.epoch + 1 }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch {} (slot {})", self.epoch, self.slot())
    }
}

// ─────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────

/// A single `(user, cluster)` pair produced by the external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub user: UserId,
    pub cluster: ClusterId,
}

impl Assignment {
    pub fn new(user: UserId, cluster: ClusterId) -> Self {
        Self { user, cluster }
    }
}

impl From<(UserId, ClusterId)> for Assignment {
    fn from((user, cluster): (UserId, ClusterId)) -> Self {
        Self { user, cluster }
    }
}

/// A vote: unique per `(user, post)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteRecord {
    pub user: UserId,
    pub post: PostId,
}

/// A relevance tag: unique per `(user, post, term)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelevanceRecord {
    pub user: UserId,
    pub post: PostId,
    pub term: String,
}

// ─────────────────────────────────────────────
// Validation helpers
// ─────────────────────────────────────────────

/// A term is a single search token: non-empty, at most [`MAX_TERM_LEN`]
/// bytes, no whitespace and no control characters.
pub fn validate_term(term: &str) -> Result<(), ClusterError> {
    let malformed = term.is_empty()
        || term.len() > MAX_TERM_LEN
        || term.chars().any(|c| c.is_whitespace() || c.is_control());
    if malformed {
        return Err(ClusterError::InvalidTerm(term.to_string()));
    }
    Ok(())
}

/// Reject query-side cluster ids outside `[0, cluster_count)`.
pub(crate) fn check_cluster(cluster: ClusterId, cluster_count: u32) -> Result<(), ClusterError> {
    if cluster >= cluster_count {
        return Err(ClusterError::ClusterNotFound { cluster, cluster_count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_slots_alternate() {
        let g0 = Generation::INITIAL;
        let g1 = g0.next();
        let g2 = g1.next();
        assert_eq!(g0.slot(), 0);
        assert_eq!(g0.staging_slot(), 1);
        assert_eq!(g1.slot(), 1);
        assert_eq!(g1.staging_slot(), 0);
        assert_eq!(g2.slot(), g0.slot());
        assert_ne!(g2, g0);
    }

    #[test]
    fn term_validation() {
        assert!(validate_term("privacy").is_ok());
        assert!(validate_term("e-voting_2").is_ok());
        assert!(validate_term("").is_err());
        assert!(validate_term("two words").is_err());
        assert!(validate_term("tab\there").is_err());
        assert!(validate_term(&"x".repeat(MAX_TERM_LEN + 1)).is_err());
        assert!(validate_term(&"x".repeat(MAX_TERM_LEN)).is_ok());
    }

    #[test]
    fn assignment_from_tuple() {
        let a: Assignment = (7, 3).into();
        assert_eq!(a, Assignment::new(7, 3));
    }

    #[test]
    fn check_cluster_bounds() {
        assert!(check_cluster(4, 5).is_ok());
        assert_eq!(
            check_cluster(5, 5),
            Err(ClusterError::ClusterNotFound { cluster: 5, cluster_count: 5 })
        );
    }
}
