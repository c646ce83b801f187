//! Error types for the partition and aggregation layer.

use thiserror::Error;

use crate::model::{ClusterId, PostId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    // ── Not found ────────────────────────────────────────────

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("post {0} not found")]
    PostNotFound(PostId),

    #[error("cluster {cluster} not found (cluster count is {cluster_count})")]
    ClusterNotFound { cluster: ClusterId, cluster_count: u32 },

    // ── Validation ───────────────────────────────────────────

    #[error("cluster {cluster} for user {user} is out of range [0, {cluster_count})")]
    ClusterOutOfRange {
        user: UserId,
        cluster: ClusterId,
        cluster_count: u32,
    },

    #[error("user {0} is not enrolled in the partition store")]
    UnknownUser(UserId),

    #[error("user {0} appears more than once in the assignment batch")]
    DuplicateUser(UserId),

    #[error("user {0} is already enrolled")]
    DuplicateEnrollment(UserId),

    #[error("invalid term: {0:?}")]
    InvalidTerm(String),

    #[error("cluster {0} cannot be connected to itself")]
    SelfLoop(ClusterId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClusterError {
    /// `true` for errors caused by an id that does not resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::PostNotFound(_) | Self::ClusterNotFound { .. }
        )
    }

    /// `true` for errors caused by malformed caller input.
    pub fn is_validation(&self) -> bool {
        !self.is_not_found()
    }
}
