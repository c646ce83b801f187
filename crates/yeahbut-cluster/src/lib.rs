//! # yeahbut-cluster
//!
//! Opinion-cluster partitioning for the Yeah-But deliberation platform.
//!
//! Cluster membership is computed offline by an external classifier and
//! installed here without interrupting live traffic:
//!
//! - [`PartitionStore`] — two cluster slots per user plus one epoch
//!   counter selecting the active slot; `rebalance` writes the idle slot,
//!   `swap` flips the counter
//! - [`ClusterSizeCache`] — memoized member counts, dropped on every swap
//! - [`ConnectivityGraph`] — symmetric cluster adjacency for neighbor
//!   sampling
//! - [`AggregationEngine`] — per-cluster vote histograms and term lookups
//!   evaluated against the active generation
//!
//! Votes, accounts and relevance tags are owned by other services and
//! reached through the [`VoteStore`] and [`AccountStore`] traits.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use yeahbut_cluster::{
//!     AggregationEngine, ClusterConfig, MemoryAccountStore, MemoryVoteStore, PartitionStore,
//! };
//!
//! let store = Arc::new(PartitionStore::new(&ClusterConfig::default()).unwrap());
//! let accounts = MemoryAccountStore::with_users([1, 2, 3]);
//! for user in [1, 2, 3] {
//!     store.enroll(&accounts, user, 0).unwrap();
//! }
//!
//! store.rebalance([(1, 1), (2, 2)]).unwrap();
//! assert_eq!(store.get_current_cluster(1).unwrap(), 0);
//! store.swap();
//! assert_eq!(store.get_current_cluster(1).unwrap(), 1);
//!
//! let votes = Arc::new(MemoryVoteStore::new());
//! votes.add_post(10);
//! for user in [1, 2, 3] {
//!     votes.vote(user, 10, None).unwrap();
//! }
//! let engine = AggregationEngine::new(store, votes);
//! assert_eq!(engine.votes_by_cluster(10).unwrap(), vec![1, 1, 1, 0, 0]);
//! ```

pub mod aggregation;
pub mod cache;
pub mod collab;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod partition;

pub use aggregation::AggregationEngine;
pub use cache::{CacheStats, ClusterSizeCache};
pub use collab::{AccountStore, MemoryAccountStore, MemoryVoteStore, VoteStore};
pub use config::ClusterConfig;
pub use error::ClusterError;
pub use graph::ConnectivityGraph;
pub use model::{Assignment, ClusterId, Generation, PostId, RelevanceRecord, UserId, VoteRecord};
pub use partition::{GenerationView, PartitionStats, PartitionStore};
