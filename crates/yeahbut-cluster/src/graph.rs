//! ConnectivityGraph — symmetric adjacency between cluster ids.
//!
//! Edges join cluster *identities*, not generations: a rebalance moves
//! users between clusters but never changes which clusters neighbor each
//! other.

use std::collections::BTreeSet;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::model::{check_cluster, ClusterId};

/// Undirected cluster graph backed by a `DashMap`.
///
/// Every edge is stored under both endpoints. `connect` writes the two
/// directions one after the other, so a reader racing a `connect` may see
/// one direction a moment before the other; once `connect` returns both
/// are visible.
#[derive(Debug)]
pub struct ConnectivityGraph {
    /// cluster → clusters one edge away
    adjacency: DashMap<ClusterId, BTreeSet<ClusterId>>,
    cluster_count: u32,
    sample_limit: usize,
}

impl ConnectivityGraph {
    /// Empty graph over `cluster_count` clusters.
    pub fn new(cluster_count: u32) -> Self {
        Self {
            adjacency: DashMap::new(),
            cluster_count,
            sample_limit: ClusterConfig::default().sample_limit,
        }
    }

    /// Every cluster connected to every *other* cluster.
    pub fn fully_connected(cluster_count: u32) -> Self {
        let graph = Self::new(cluster_count);
        for a in 0..cluster_count {
            let others: BTreeSet<ClusterId> = (0..cluster_count).filter(|&b| b != a).collect();
            graph.adjacency.insert(a, others);
        }
        info!(cluster_count, edges = graph.edge_count(), "built fully connected cluster graph");
        graph
    }

    /// Graph shaped by a [`ClusterConfig`].
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let mut graph = if config.fully_connected {
            Self::fully_connected(config.cluster_count)
        } else {
            Self::new(config.cluster_count)
        };
        graph.sample_limit = config.sample_limit;
        Ok(graph)
    }

    /// Graph holding exactly the given undirected edges.
    pub fn from_edges(
        cluster_count: u32,
        edges: impl IntoIterator<Item = (ClusterId, ClusterId)>,
    ) -> Result<Self, ClusterError> {
        let graph = Self::new(cluster_count);
        for (a, b) in edges {
            graph.connect(a, b)?;
        }
        Ok(graph)
    }

    // ── Mutations ──────────────────────────────────────

    /// Add the undirected edge `(a, b)`. Returns `false` if it already existed.
    pub fn connect(&self, a: ClusterId, b: ClusterId) -> Result<bool, ClusterError> {
        self.check_edge(a, b)?;
        let added = self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        Ok(added)
    }

    /// Remove the undirected edge `(a, b)`. Returns `false` if it was absent.
    pub fn disconnect(&self, a: ClusterId, b: ClusterId) -> Result<bool, ClusterError> {
        self.check_edge(a, b)?;
        let removed = self
            .adjacency
            .get_mut(&a)
            .map(|mut n| n.remove(&b))
            .unwrap_or(false);
        if let Some(mut n) = self.adjacency.get_mut(&b) {
            n.remove(&a);
        }
        Ok(removed)
    }

    // ── Queries ────────────────────────────────────────

    /// All clusters one edge away from `cluster`.
    pub fn neighbors(&self, cluster: ClusterId) -> Result<BTreeSet<ClusterId>, ClusterError> {
        check_cluster(cluster, self.cluster_count)?;
        Ok(self
            .adjacency
            .get(&cluster)
            .map(|n| n.clone())
            .unwrap_or_default())
    }

    /// Random subset of [`neighbors`](Self::neighbors) of size
    /// `min(count, |neighbors|, sample_limit)`.
    pub fn sample_neighbors(
        &self,
        cluster: ClusterId,
        count: usize,
    ) -> Result<Vec<ClusterId>, ClusterError> {
        self.sample_neighbors_with(cluster, count, &mut rand::thread_rng())
    }

    /// [`sample_neighbors`](Self::sample_neighbors) with a caller-supplied RNG.
    pub fn sample_neighbors_with<R: Rng + ?Sized>(
        &self,
        cluster: ClusterId,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<ClusterId>, ClusterError> {
        let pool: Vec<ClusterId> = self.neighbors(cluster)?.into_iter().collect();
        let take = count.min(self.sample_limit);
        let sample: Vec<ClusterId> = pool.choose_multiple(rng, take).copied().collect();
        debug!(cluster, requested = count, returned = sample.len(), "sampled neighbor clusters");
        Ok(sample)
    }

    pub fn are_connected(&self, a: ClusterId, b: ClusterId) -> bool {
        self.adjacency
            .get(&a)
            .map(|n| n.contains(&b))
            .unwrap_or(false)
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|kv| kv.value().len()).sum::<usize>() / 2
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    fn check_edge(&self, a: ClusterId, b: ClusterId) -> Result<(), ClusterError> {
        check_cluster(a, self.cluster_count)?;
        check_cluster(b, self.cluster_count)?;
        if a == b {
            return Err(ClusterError::SelfLoop(a));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
