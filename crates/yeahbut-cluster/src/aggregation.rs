//! AggregationEngine — cluster-scoped queries over vote and relevance data.
//!
//! ## Consistency
//!
//! Each query pins the active generation once (see
//! [`GenerationView`](crate::GenerationView)) and resolves every voter
//! through it, so a query that starts before a swap counts every vote
//! under the old partition. Queries are *not* snapshots of the vote store:
//! votes recorded while a query runs may or may not be included, and a
//! query spanning a swap followed by a fresh rebalance may see a mix of
//! generations.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::collab::VoteStore;
use crate::error::ClusterError;
use crate::model::{check_cluster, validate_term, ClusterId, PostId, UserId};
use crate::partition::PartitionStore;

pub struct AggregationEngine<V: VoteStore> {
    partitions: Arc<PartitionStore>,
    votes: Arc<V>,
}

impl<V: VoteStore> AggregationEngine<V> {
    pub fn new(partitions: Arc<PartitionStore>, votes: Arc<V>) -> Self {
        Self { partitions, votes }
    }

    pub fn partitions(&self) -> &PartitionStore {
        &self.partitions
    }

    pub fn votes(&self) -> &V {
        &self.votes
    }

    // ── Votes ────────────────────────────────────────────────

    /// Vote histogram for `post`, indexed by cluster id `0..K`.
    ///
    /// Clusters with no votes hold `0`. The histogram sums to the number
    /// of votes the store returned for `post`; a voter missing from the
    /// partition store fails the whole query with `UserNotFound`.
    pub fn votes_by_cluster(&self, post: PostId) -> Result<Vec<usize>, ClusterError> {
        let voters = self.voters_by_cluster(post)?;
        Ok(voters.iter().map(Vec::len).collect())
    }

    /// Voters of `post` grouped by their current cluster.
    pub fn voters_by_cluster(&self, post: PostId) -> Result<Vec<Vec<UserId>>, ClusterError> {
        if !self.votes.post_exists(post) {
            return Err(ClusterError::PostNotFound(post));
        }
        let view = self.partitions.view();
        let mut grouped = vec![Vec::new(); self.partitions.cluster_count() as usize];
        for user in self.votes.votes_for_post(post) {
            let cluster = view.cluster_of(user)?;
            grouped[cluster as usize].push(user);
        }
        debug!(post, epoch = view.generation().epoch, "aggregated votes by cluster");
        Ok(grouped)
    }

    /// Votes per cluster divided by cluster size; `0.0` for empty clusters.
    pub fn cluster_vote_share(&self, post: PostId) -> Result<Vec<f64>, ClusterError> {
        let counts = self.votes_by_cluster(post)?;
        let sizes = self.partitions.cluster_sizes()?;
        Ok(counts
            .iter()
            .zip(sizes)
            .map(|(&votes, size)| if size == 0 { 0.0 } else { votes as f64 / size as f64 })
            .collect())
    }

    // ── Terms ────────────────────────────────────────────────

    /// Number of relevance tags carrying `term`, across all clusters.
    pub fn term_popularity(&self, term: &str) -> Result<usize, ClusterError> {
        validate_term(term)?;
        Ok(self.votes.relevance_for_term(term).len())
    }

    /// Posts tagged with `term` by a user currently in one of `clusters`.
    ///
    /// Each post appears once, in ascending id order, however many
    /// qualifying users tagged it.
    pub fn term_in_clusters(
        &self,
        term: &str,
        clusters: impl IntoIterator<Item = ClusterId>,
    ) -> Result<Vec<PostId>, ClusterError> {
        validate_term(term)?;
        let cluster_count = self.partitions.cluster_count();
        let wanted: BTreeSet<ClusterId> = clusters.into_iter().collect();
        for &cluster in &wanted {
            check_cluster(cluster, cluster_count)?;
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let view = self.partitions.view();
        let mut posts = BTreeSet::new();
        for (user, post) in self.votes.relevance_for_term(term) {
            if wanted.contains(&view.cluster_of(user)?) {
                posts.insert(post);
            }
        }
        debug!(term, clusters = wanted.len(), posts = posts.len(), "term lookup in clusters");
        Ok(posts.into_iter().collect())
    }
}
