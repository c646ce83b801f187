//! Collaborator interfaces consumed by the partition and aggregation layer.
//!
//! Accounts, votes and relevance tags are owned by other services; the
//! cluster core only reads them through these traits. The `Memory*`
//! implementations back tests and single-process deployments.

use dashmap::{DashMap, DashSet};

use crate::error::ClusterError;
use crate::model::{validate_term, PostId, RelevanceRecord, UserId, VoteRecord};

// ─────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────

/// Read access to the account service.
pub trait AccountStore: Send + Sync {
    fn user_exists(&self, user: UserId) -> bool;
}

/// Read access to vote and relevance storage.
pub trait VoteStore: Send + Sync {
    fn post_exists(&self, post: PostId) -> bool;

    /// Every user that voted for `post`, one entry per voter.
    fn votes_for_post(&self, post: PostId) -> Vec<UserId>;

    /// Every `(user, post)` pair tagged with `term`.
    fn relevance_for_term(&self, term: &str) -> Vec<(UserId, PostId)>;
}

// ─────────────────────────────────────────────
// MemoryAccountStore
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    users: DashSet<UserId>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        let store = Self::new();
        for user in users {
            store.add_user(user);
        }
        store
    }

    /// Returns `false` if the user already existed.
    pub fn add_user(&self, user: UserId) -> bool {
        self.users.insert(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl AccountStore for MemoryAccountStore {
    fn user_exists(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }
}

// ─────────────────────────────────────────────
// MemoryVoteStore
// ─────────────────────────────────────────────

/// In-memory vote and relevance storage.
///
/// A vote is unique per `(user, post)` and a relevance tag per
/// `(user, post, term)`; repeating either is a no-op.
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    posts: DashSet<PostId>,
    /// post → voters, in vote order
    votes: DashMap<PostId, Vec<UserId>>,
    /// user → posts voted for, in vote order
    by_user: DashMap<UserId, Vec<PostId>>,
    /// term → (user, post) tags
    relevance: DashMap<String, Vec<(UserId, PostId)>>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: PostId) {
        self.posts.insert(post);
    }

    /// Record a vote by `user` on `post`, optionally tagging it with `term`.
    ///
    /// Returns `true` if a new vote was recorded. Tagging an existing vote
    /// with a new term still records the relevance tag.
    pub fn vote(&self, user: UserId, post: PostId, term: Option<&str>) -> Result<bool, ClusterError> {
        if !self.posts.contains(&post) {
            return Err(ClusterError::PostNotFound(post));
        }
        if let Some(term) = term {
            validate_term(term)?;
        }

        let added = {
            let mut voters = self.votes.entry(post).or_default();
            if voters.contains(&user) {
                false
            } else {
                voters.push(user);
                true
            }
        };
        if added {
            self.by_user.entry(user).or_default().push(post);
        }

        if let Some(term) = term {
            let mut tags = self.relevance.entry(term.to_string()).or_default();
            if !tags.contains(&(user, post)) {
                tags.push((user, post));
            }
        }
        Ok(added)
    }

    pub fn voted_for(&self, user: UserId, post: PostId) -> bool {
        self.votes
            .get(&post)
            .map(|v| v.contains(&user))
            .unwrap_or(false)
    }

    pub fn votes_by_user(&self, user: UserId) -> Vec<PostId> {
        self.by_user
            .get(&user)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Every vote, ordered by post then vote order.
    pub fn dump_votes(&self) -> Vec<VoteRecord> {
        let mut posts: Vec<PostId> = self.votes.iter().map(|kv| *kv.key()).collect();
        posts.sort_unstable();
        posts
            .into_iter()
            .flat_map(|post| {
                self.votes_for_post(post)
                    .into_iter()
                    .map(move |user| VoteRecord { user, post })
            })
            .collect()
    }

    /// Every relevance tag for `term`.
    pub fn relevance_records(&self, term: &str) -> Vec<RelevanceRecord> {
        self.relevance_for_term(term)
            .into_iter()
            .map(|(user, post)| RelevanceRecord { user, post, term: term.to_string() })
            .collect()
    }
}

impl VoteStore for MemoryVoteStore {
    fn post_exists(&self, post: PostId) -> bool {
        self.posts.contains(&post)
    }

    fn votes_for_post(&self, post: PostId) -> Vec<UserId> {
        self.votes
            .get(&post)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn relevance_for_term(&self, term: &str) -> Vec<(UserId, PostId)> {
        self.relevance
            .get(term)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_are_unique_per_user_and_post() {
        let store = MemoryVoteStore::new();
        store.add_post(1);

        assert!(store.vote(10, 1, None).unwrap());
        assert!(!store.vote(10, 1, None).unwrap());
        assert!(store.vote(11, 1, None).unwrap());

        assert_eq!(store.votes_for_post(1), vec![10, 11]);
        assert_eq!(store.votes_by_user(10), vec![1]);
        assert!(store.voted_for(11, 1));
        assert!(!store.voted_for(12, 1));
    }

    #[test]
    fn relevance_is_unique_per_triple() {
        let store = MemoryVoteStore::new();
        store.add_post(1);
        store.add_post(2);

        store.vote(10, 1, Some("privacy")).unwrap();
        store.vote(10, 1, Some("privacy")).unwrap();
        store.vote(10, 1, Some("surveillance")).unwrap();
        store.vote(11, 2, Some("privacy")).unwrap();

        assert_eq!(store.relevance_for_term("privacy"), vec![(10, 1), (11, 2)]);
        assert_eq!(store.relevance_for_term("surveillance"), vec![(10, 1)]);
        assert_eq!(store.votes_for_post(1), vec![10]);
        assert_eq!(store.relevance_records("privacy")[1].term, "privacy");
    }

    #[test]
    fn vote_on_missing_post_fails() {
        let store = MemoryVoteStore::new();
        assert_eq!(store.vote(1, 99, None), Err(ClusterError::PostNotFound(99)));
    }

    #[test]
    fn malformed_term_is_rejected_before_any_write() {
        let store = MemoryVoteStore::new();
        store.add_post(1);
        assert!(matches!(store.vote(1, 1, Some("two words")), Err(ClusterError::InvalidTerm(_))));
        assert!(store.votes_for_post(1).is_empty());
    }

    #[test]
    fn dump_votes_lists_every_pair() {
        let store = MemoryVoteStore::new();
        store.add_post(2);
        store.add_post(1);
        store.vote(5, 2, None).unwrap();
        store.vote(6, 1, None).unwrap();
        store.vote(7, 2, None).unwrap();

        let dump = store.dump_votes();
        assert_eq!(
            dump,
            vec![
                VoteRecord { user: 6, post: 1 },
                VoteRecord { user: 5, post: 2 },
                VoteRecord { user: 7, post: 2 },
            ]
        );
    }

    #[test]
    fn account_store_membership() {
        let accounts = MemoryAccountStore::with_users([1, 2, 3]);
        assert!(accounts.user_exists(2));
        assert!(!accounts.user_exists(4));
        assert!(!accounts.add_user(3));
        assert_eq!(accounts.len(), 3);
    }
}
