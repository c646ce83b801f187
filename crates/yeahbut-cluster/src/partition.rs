//! PartitionStore — double-buffered cluster membership.
//!
//! Every enrolled user owns two cluster slots. A single epoch counter
//! selects which slot serves reads (`epoch & 1`); the other slot is the
//! staging area that [`PartitionStore::rebalance`] writes into. Installing
//! a new partition is one atomic increment in [`PartitionStore::swap`], so
//! a reader sees either the whole old assignment or the whole new one.
//!
//! ## Lifecycle
//!
//! ```text
//! STEADY(g) ──rebalance()──▶ STEADY(g)      (staging slot written, reads unchanged)
//! STEADY(g) ──swap()───────▶ STEADY(g + 1)  (staging slot becomes active)
//! ```
//!
//! ## Locking
//!
//! Reads never take the writer gate; they go straight to the `DashMap`
//! shard holding the user and to the epoch atomic. `rebalance`, `enroll`
//! and `swap` serialize on one `parking_lot::Mutex`. The critical section
//! of `swap` is an increment plus a cache clear, independent of user count.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ClusterSizeCache, SizeKey};
use crate::collab::AccountStore;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::model::{check_cluster, Assignment, ClusterId, Generation, UserId};

// ─────────────────────────────────────────────
// PartitionStats
// ─────────────────────────────────────────────

/// Point-in-time description of a [`PartitionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub generation: Generation,
    pub revision: u64,
    pub users: usize,
    pub cluster_count: u32,
    /// Whether the staging slot has been seeded for the active generation.
    pub staged: bool,
    pub cache: CacheStats,
}

// ─────────────────────────────────────────────
// PartitionStore
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct WriterState {
    /// Epoch whose staging slot has been seeded from its active slot.
    staged_for: Option<u64>,
}

/// Thread-safe dual-generation cluster assignment for every enrolled user.
#[derive(Debug)]
pub struct PartitionStore {
    /// user → [slot 0, slot 1]
    users: DashMap<UserId, [ClusterId; 2]>,
    /// Swap counter; the active slot is `epoch & 1`.
    epoch: AtomicU64,
    /// Bumped whenever active-generation membership changes.
    revision: AtomicU64,
    sizes: ClusterSizeCache,
    writer: Mutex<WriterState>,
    cluster_count: u32,
    sample_limit: usize,
}

impl PartitionStore {
    pub fn new(config: &ClusterConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        Ok(Self {
            users: DashMap::new(),
            epoch: AtomicU64::new(Generation::INITIAL.epoch),
            revision: AtomicU64::new(0),
            sizes: ClusterSizeCache::new(),
            writer: Mutex::new(WriterState::default()),
            cluster_count: config.cluster_count,
            sample_limit: config.sample_limit,
        })
    }

    // ── Generation ───────────────────────────────────────────

    /// The generation currently serving reads.
    pub fn generation(&self) -> Generation {
        Generation { epoch: self.epoch.load(Ordering::Acquire) }
    }

    /// Pin the active generation for a multi-read operation.
    pub fn view(&self) -> GenerationView<'_> {
        GenerationView { store: self, generation: self.generation() }
    }

    // ── Reads ────────────────────────────────────────────────

    /// The user's cluster in the active generation.
    pub fn get_current_cluster(&self, user: UserId) -> Result<ClusterId, ClusterError> {
        self.view().cluster_of(user)
    }

    /// The user's cluster in the staging slot, i.e. what the next
    /// [`swap`](Self::swap) would make current.
    pub fn get_staged_cluster(&self, user: UserId) -> Result<ClusterId, ClusterError> {
        let slot = self.generation().staging_slot();
        self.users
            .get(&user)
            .map(|slots| slots[slot])
            .ok_or(ClusterError::UserNotFound(user))
    }

    /// Member count of `cluster` in the active generation, memoized until
    /// the next swap or enrollment.
    pub fn size_of(&self, cluster: ClusterId) -> Result<usize, ClusterError> {
        check_cluster(cluster, self.cluster_count)?;
        // Revision before epoch: swap bumps them in the opposite order.
        let revision = self.revision.load(Ordering::Acquire);
        let generation = self.generation();
        let key = SizeKey { generation, revision, cluster };
        Ok(self
            .sizes
            .get_or_compute(key, || self.count_members(generation.slot(), cluster)))
    }

    /// Dense `size_of` for every cluster id in `[0, K)`.
    pub fn cluster_sizes(&self) -> Result<Vec<usize>, ClusterError> {
        (0..self.cluster_count).map(|c| self.size_of(c)).collect()
    }

    /// Up to `count` random users currently in `cluster`.
    pub fn sample_users(&self, cluster: ClusterId, count: usize) -> Result<Vec<UserId>, ClusterError> {
        self.sample_users_with(cluster, count, &mut rand::thread_rng())
    }

    /// [`sample_users`](Self::sample_users) with a caller-supplied RNG.
    pub fn sample_users_with<R: Rng + ?Sized>(
        &self,
        cluster: ClusterId,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<UserId>, ClusterError> {
        check_cluster(cluster, self.cluster_count)?;
        let view = self.view();
        let members = view.members(cluster);
        let take = count.min(self.sample_limit);
        let sample: Vec<UserId> = members.choose_multiple(rng, take).copied().collect();
        debug!(cluster, requested = count, returned = sample.len(), "sampled cluster members");
        Ok(sample)
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.users.contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn stats(&self) -> PartitionStats {
        let staged = {
            let writer = self.writer.lock();
            writer.staged_for == Some(self.generation().epoch)
        };
        PartitionStats {
            generation: self.generation(),
            revision: self.revision.load(Ordering::Acquire),
            users: self.users.len(),
            cluster_count: self.cluster_count,
            staged,
            cache: self.sizes.stats(),
        }
    }

    // ── Writes ───────────────────────────────────────────────

    /// Add a user known to `accounts`, placing them in `cluster` in both
    /// generations so the next swap keeps them where they are.
    pub fn enroll(
        &self,
        accounts: &dyn AccountStore,
        user: UserId,
        cluster: ClusterId,
    ) -> Result<(), ClusterError> {
        if !accounts.user_exists(user) {
            return Err(ClusterError::UserNotFound(user));
        }
        if cluster >= self.cluster_count {
            return Err(ClusterError::ClusterOutOfRange {
                user,
                cluster,
                cluster_count: self.cluster_count,
            });
        }

        let _writer = self.writer.lock();
        match self.users.entry(user) {
            Entry::Occupied(_) => return Err(ClusterError::DuplicateEnrollment(user)),
            Entry::Vacant(slot) => {
                slot.insert([cluster; 2]);
            }
        }
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        self.sizes.evict_before(revision);
        debug!(user, cluster, "enrolled user");
        Ok(())
    }

    /// Write a full or partial assignment into the staging generation.
    ///
    /// The batch is validated as a whole before any slot is written: an
    /// out-of-range cluster, an unknown user or a user listed twice rejects
    /// the entire batch and leaves the staging slot untouched. Reads of the
    /// active generation are unaffected either way.
    ///
    /// The first rebalance after a swap copies every user's active cluster
    /// into the staging slot before applying the batch, so users absent
    /// from a partial batch keep their current cluster. Repeated rebalances
    /// before the next swap layer on top of each other.
    ///
    /// Returns the number of assignments written.
    pub fn rebalance<I, A>(&self, assignments: I) -> Result<usize, ClusterError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Assignment>,
    {
        let batch: Vec<Assignment> = assignments.into_iter().map(Into::into).collect();

        let mut writer = self.writer.lock();
        let generation = self.generation();

        if let Err(e) = self.validate_batch(&batch) {
            warn!(epoch = generation.epoch, batch = batch.len(), error = %e, "rejected rebalance batch");
            return Err(e);
        }

        let active = generation.slot();
        let staging = generation.staging_slot();

        if writer.staged_for != Some(generation.epoch) {
            for mut slots in self.users.iter_mut() {
                let current = slots[active];
                slots[staging] = current;
            }
            writer.staged_for = Some(generation.epoch);
            debug!(epoch = generation.epoch, users = self.users.len(), "seeded staging generation");
        }

        for a in &batch {
            if let Some(mut slots) = self.users.get_mut(&a.user) {
                slots[staging] = a.cluster;
            }
        }

        info!(epoch = generation.epoch, staging_slot = staging, written = batch.len(), "rebalance staged");
        Ok(batch.len())
    }

    /// Make the staging generation current and drop every cached size.
    ///
    /// Swapping without a rebalance since the last swap re-activates the
    /// previous generation unchanged, which makes `swap` its own undo.
    pub fn swap(&self) -> Generation {
        let _writer = self.writer.lock();
        let previous = Generation { epoch: self.epoch.fetch_add(1, Ordering::AcqRel) };
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.sizes.invalidate_all();
        let current = previous.next();
        info!(
            from_epoch = previous.epoch,
            to_epoch = current.epoch,
            active_slot = current.slot(),
            "swapped cluster generation"
        );
        current
    }

    // ── Internals ────────────────────────────────────────────

    fn validate_batch(&self, batch: &[Assignment]) -> Result<(), ClusterError> {
        let mut seen = HashSet::with_capacity(batch.len());
        for a in batch {
            if a.cluster >= self.cluster_count {
                return Err(ClusterError::ClusterOutOfRange {
                    user: a.user,
                    cluster: a.cluster,
                    cluster_count: self.cluster_count,
                });
            }
            if !self.users.contains_key(&a.user) {
                return Err(ClusterError::UnknownUser(a.user));
            }
            if !seen.insert(a.user) {
                return Err(ClusterError::DuplicateUser(a.user));
            }
        }
        Ok(())
    }

    fn count_members(&self, slot: usize, cluster: ClusterId) -> usize {
        self.users
            .iter()
            .filter(|kv| kv.value()[slot] == cluster)
            .count()
    }
}

// ─────────────────────────────────────────────
// GenerationView
// ─────────────────────────────────────────────

/// A [`PartitionStore`] read handle pinned to one generation.
///
/// All lookups through a view resolve against the slot that was active
/// when the view was taken, even if a swap happens meanwhile. The only
/// way a view can observe a change is if a swap *and* a subsequent
/// rebalance both complete while it is alive, since that rebalance writes
/// into the pinned slot.
#[derive(Debug, Clone, Copy)]
pub struct GenerationView<'a> {
    store: &'a PartitionStore,
    generation: Generation,
}

impl GenerationView<'_> {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn cluster_of(&self, user: UserId) -> Result<ClusterId, ClusterError> {
        let slot = self.generation.slot();
        self.store
            .users
            .get(&user)
            .map(|slots| slots[slot])
            .ok_or(ClusterError::UserNotFound(user))
    }

    /// Every user assigned to `cluster` in this generation, unordered.
    pub fn members(&self, cluster: ClusterId) -> Vec<UserId> {
        let slot = self.generation.slot();
        self.store
            .users
            .iter()
            .filter(|kv| kv.value()[slot] == cluster)
            .map(|kv| *kv.key())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryAccountStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Store with `K = 5` and users `1..=n` all in cluster 0.
    fn store_with_users(n: u64) -> PartitionStore {
        let store = PartitionStore::new(&ClusterConfig::default()).unwrap();
        let accounts = MemoryAccountStore::with_users(1..=n);
        for user in 1..=n {
            store.enroll(&accounts, user, 0).unwrap();
        }
        store
    }

    #[test]
    fn rebalance_is_invisible_until_swap() {
        let store = store_with_users(5);
        store.rebalance([(1, 1), (2, 2)]).unwrap();

        assert_eq!(store.get_current_cluster(1).unwrap(), 0);
        assert_eq!(store.get_current_cluster(2).unwrap(), 0);
        assert_eq!(store.get_staged_cluster(1).unwrap(), 1);
        assert_eq!(store.generation(), Generation::INITIAL);

        let g = store.swap();
        assert_eq!(g.epoch, 1);
        assert_eq!(store.get_current_cluster(1).unwrap(), 1);
        assert_eq!(store.get_current_cluster(2).unwrap(), 2);
        assert_eq!(store.get_current_cluster(3).unwrap(), 0);
    }

    #[test]
    fn partial_rebalance_carries_forward_untouched_users() {
        let store = store_with_users(3);
        store.rebalance([(1, 4)]).unwrap();
        store.swap();
        // Second cycle moves only user 2; user 1 must stay in 4.
        store.rebalance([(2, 3)]).unwrap();
        store.swap();

        assert_eq!(store.get_current_cluster(1).unwrap(), 4);
        assert_eq!(store.get_current_cluster(2).unwrap(), 3);
        assert_eq!(store.get_current_cluster(3).unwrap(), 0);
    }

    #[test]
    fn repeated_rebalance_overwrites_staging() {
        let store = store_with_users(2);
        store.rebalance([(1, 1), (2, 1)]).unwrap();
        store.rebalance([(1, 3)]).unwrap();
        store.swap();

        assert_eq!(store.get_current_cluster(1).unwrap(), 3);
        assert_eq!(store.get_current_cluster(2).unwrap(), 1);
    }

    #[test]
    fn swap_without_rebalance_rolls_back() {
        let store = store_with_users(1);
        store.rebalance([(1, 2)]).unwrap();
        store.swap();
        assert_eq!(store.get_current_cluster(1).unwrap(), 2);

        store.swap();
        assert_eq!(store.get_current_cluster(1).unwrap(), 0);
    }

    #[test]
    fn out_of_range_cluster_rejects_whole_batch() {
        let store = store_with_users(3);
        let err = store.rebalance([(1, 1), (2, 9)]).unwrap_err();
        assert_eq!(err, ClusterError::ClusterOutOfRange { user: 2, cluster: 9, cluster_count: 5 });
        assert!(err.is_validation());

        store.rebalance(Vec::<Assignment>::new()).unwrap();
        store.swap();
        assert_eq!(store.get_current_cluster(1).unwrap(), 0);
    }

    #[test]
    fn unknown_and_duplicate_users_rejected() {
        let store = store_with_users(2);
        assert_eq!(store.rebalance([(9, 1)]), Err(ClusterError::UnknownUser(9)));
        assert_eq!(store.rebalance([(1, 1), (1, 2)]), Err(ClusterError::DuplicateUser(1)));
    }

    #[test]
    fn unknown_user_lookup_is_not_found() {
        let store = store_with_users(1);
        let err = store.get_current_cluster(42).unwrap_err();
        assert_eq!(err, ClusterError::UserNotFound(42));
        assert!(err.is_not_found());
    }

    #[test]
    fn enroll_checks_accounts_range_and_duplicates() {
        let store = PartitionStore::new(&ClusterConfig::default()).unwrap();
        let accounts = MemoryAccountStore::with_users([1]);

        assert_eq!(store.enroll(&accounts, 2, 0), Err(ClusterError::UserNotFound(2)));
        assert!(matches!(
            store.enroll(&accounts, 1, 5),
            Err(ClusterError::ClusterOutOfRange { .. })
        ));
        store.enroll(&accounts, 1, 4).unwrap();
        assert_eq!(store.enroll(&accounts, 1, 4), Err(ClusterError::DuplicateEnrollment(1)));
        assert_eq!(store.get_current_cluster(1).unwrap(), 4);
        assert_eq!(store.get_staged_cluster(1).unwrap(), 4);
    }

    #[test]
    fn size_of_is_cached_and_invalidated_on_swap() {
        let store = store_with_users(5);
        assert_eq!(store.size_of(0).unwrap(), 5);
        assert_eq!(store.size_of(0).unwrap(), 5);
        assert_eq!(store.stats().cache.hits, 1);

        store.rebalance([(1, 1), (2, 2)]).unwrap();
        assert_eq!(store.size_of(0).unwrap(), 5);

        store.swap();
        assert_eq!(store.stats().cache.entries, 0);
        assert_eq!(store.cluster_sizes().unwrap(), vec![3, 1, 1, 0, 0]);
    }

    #[test]
    fn enroll_refreshes_cached_sizes() {
        let store = store_with_users(2);
        assert_eq!(store.size_of(0).unwrap(), 2);

        let accounts = MemoryAccountStore::with_users([3]);
        store.enroll(&accounts, 3, 0).unwrap();
        assert_eq!(store.size_of(0).unwrap(), 3);
    }

    #[test]
    fn size_of_unknown_cluster_is_not_found() {
        let store = store_with_users(1);
        assert!(store.size_of(5).unwrap_err().is_not_found());
    }

    #[test]
    fn sample_users_returns_members_only() {
        let store = store_with_users(6);
        store.rebalance([(1, 2), (2, 2), (3, 2)]).unwrap();
        store.swap();

        let mut rng = StdRng::seed_from_u64(11);
        let sample = store.sample_users_with(2, 2, &mut rng).unwrap();
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|u| [1, 2, 3].contains(u)));

        let all = store.sample_users_with(2, 100, &mut rng).unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.sample_users(4, 10).unwrap().is_empty());
    }

    #[test]
    fn view_stays_pinned_across_swap() {
        let store = store_with_users(2);
        store.rebalance([(1, 3)]).unwrap();

        let view = store.view();
        store.swap();

        assert_eq!(view.cluster_of(1).unwrap(), 0);
        assert_eq!(store.get_current_cluster(1).unwrap(), 3);
        assert_eq!(view.generation(), Generation::INITIAL);
    }

    #[test]
    fn stats_track_staging() {
        let store = store_with_users(2);
        assert!(!store.stats().staged);
        store.rebalance([(1, 1)]).unwrap();
        assert!(store.stats().staged);
        store.swap();

        let stats = store.stats();
        assert!(!stats.staged);
        assert_eq!(stats.generation.epoch, 1);
        assert_eq!(stats.users, 2);
        assert_eq!(stats.cluster_count, 5);
    }
}
