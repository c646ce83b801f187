//! Partition configuration loaded from environment variables.
//!
//! Every setting has a default, so an empty environment yields a usable
//! configuration.
//!
//! | Variable                   | Default | Description                                   |
//! |----------------------------|---------|-----------------------------------------------|
//! | `YEAHBUT_CLUSTER_COUNT`    | `5`     | Number of clusters `K`; ids are `[0, K)`      |
//! | `YEAHBUT_FULLY_CONNECTED`  | `true`  | Seed the connectivity graph with every pair   |
//! | `YEAHBUT_SAMPLE_LIMIT`     | `256`   | Upper bound on any sampling `count`           |

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Runtime configuration for a [`PartitionStore`](crate::PartitionStore)
/// and its [`ConnectivityGraph`](crate::ConnectivityGraph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of clusters `K`.
    pub cluster_count: u32,

    /// Connect every cluster to every other cluster at startup.
    pub fully_connected: bool,

    /// Maximum number of users or neighbors a single sampling call returns.
    pub sample_limit: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_count: 5,
            fully_connected: true,
            sample_limit: 256,
        }
    }
}

impl ClusterConfig {
    /// Load configuration from the process environment, applying defaults
    /// where a variable is absent or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            cluster_count:   env_parse(&lookup, "YEAHBUT_CLUSTER_COUNT", defaults.cluster_count),
            fully_connected: env_bool(&lookup, "YEAHBUT_FULLY_CONNECTED", defaults.fully_connected),
            sample_limit:    env_parse(&lookup, "YEAHBUT_SAMPLE_LIMIT", defaults.sample_limit),
        }
    }

    pub fn with_cluster_count(mut self, cluster_count: u32) -> Self {
        self.cluster_count = cluster_count;
        self
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.cluster_count == 0 {
            return Err(ClusterError::InvalidConfig("cluster_count must be at least 1".into()));
        }
        if self.sample_limit == 0 {
            return Err(ClusterError::InvalidConfig("sample_limit must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
