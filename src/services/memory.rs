use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::core::window::wait_order;
use crate::models::{
    pair_key, BlockedPair, Match, MatchId, PairingCommit, ProfileUpdate, Report, User, UserId, UserState,
};
use crate::services::store::{StateStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    matches: BTreeMap<MatchId, Match>,
    blocked_pairs: Vec<BlockedPair>,
    reports: Vec<Report>,
    next_match_id: MatchId,
    next_report_id: i64,
}

impl Tables {
    fn has_open_match(&self, user_id: UserId) -> bool {
        self.matches.values().any(|m| m.is_open() && m.involves(user_id))
    }

    fn insert_match(&mut self, user_a: UserId, user_b: UserId, now: DateTime<Utc>) -> Option<Match> {
        if user_a == user_b || self.has_open_match(user_a) || self.has_open_match(user_b) {
            return None;
        }

        self.next_match_id += 1;
        let record = Match {
            match_id: self.next_match_id,
            user1_id: user_a,
            user2_id: user_b,
            created_at: now,
            ended_at: None,
            ended_by: None,
        };
        self.matches.insert(record.match_id, record.clone());
        Some(record)
    }

    fn is_searching(&self, user_id: UserId) -> bool {
        self.users
            .get(&user_id)
            .map_or(false, |u| u.state == UserState::Searching && !u.is_blocked)
    }
}

/// Process-local state store
///
/// Every operation takes one lock over all tables, which gives the
/// at-most-once match creation the engine relies on. Used by the test
/// suite and by `database.backend = "memory"`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full user record
    pub async fn put_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.user_id, user);
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.tables.lock().await.matches.values().cloned().collect()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.tables.lock().await.reports.clone()
    }

    pub async fn blocked_pairs(&self) -> Vec<BlockedPair> {
        self.tables.lock().await.blocked_pairs.clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create_user(&self, user_id: UserId, username: Option<&str>) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .entry(user_id)
            .or_insert_with(|| User::new(user_id, username.map(str::to_string), Utc::now()));
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn update_profile(&self, user_id: UserId, profile: &ProfileUpdate) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        profile.apply_to(user);
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_state_if(&self, user_id: UserId, from: &[UserState], to: UserState) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user) if from.contains(&user.state) => {
                user.enter_state(to, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.is_blocked = blocked;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_searching_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        let mut pool: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.state == UserState::Searching && !u.is_blocked)
            .cloned()
            .collect();
        pool.sort_by(wait_order);
        Ok(pool)
    }

    async fn grant_premium(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.is_premium = true;
        user.premium_plan = Some(plan.to_string());
        user.premium_expires_at = Some(expires_at);
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn downgrade_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user_id) {
            Some(user) if user.is_premium || user.premium_expires_at.is_some() => {
                user.clear_premium();
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_free_matches(&self, user_id: UserId) -> Result<(), StoreError> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.free_matches_used += 1;
        }
        Ok(())
    }

    async fn create_match_if_absent(&self, user_a: UserId, user_b: UserId) -> Result<Option<MatchId>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.insert_match(user_a, user_b, Utc::now()).map(|m| m.match_id))
    }

    async fn commit_pairing(&self, commit: &PairingCommit) -> Result<Option<Match>, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        if !tables.is_searching(commit.user_a) || !tables.is_searching(commit.user_b) {
            return Ok(None);
        }

        let Some(record) = tables.insert_match(commit.user_a, commit.user_b, now) else {
            return Ok(None);
        };

        for user_id in commit.charged_users() {
            if let Some(user) = tables.users.get_mut(&user_id) {
                user.free_matches_used += 1;
            }
        }
        for user_id in record.participants() {
            if let Some(user) = tables.users.get_mut(&user_id) {
                user.enter_state(UserState::Chatting, now);
            }
        }

        Ok(Some(record))
    }

    async fn get_open_match(&self, user_id: UserId) -> Result<Option<Match>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .matches
            .values()
            .find(|m| m.is_open() && m.involves(user_id))
            .cloned())
    }

    async fn end_match(&self, match_id: MatchId, ended_by: UserId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.matches.get_mut(&match_id) {
            Some(record) if record.is_open() => {
                record.ended_at = Some(Utc::now());
                record.ended_by = Some(ended_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn other_participant(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .matches
            .get(&match_id)
            .and_then(|m| m.other_participant(user_id)))
    }

    async fn excluded_partners(
        &self,
        user_id: UserId,
        include_past_partners: bool,
    ) -> Result<HashSet<UserId>, StoreError> {
        let tables = self.tables.lock().await;
        let mut excluded: HashSet<UserId> = tables
            .blocked_pairs
            .iter()
            .filter_map(|b| {
                if b.blocker_id == user_id {
                    Some(b.blocked_id)
                } else if b.blocked_id == user_id {
                    Some(b.blocker_id)
                } else {
                    None
                }
            })
            .collect();

        excluded.extend(
            tables
                .matches
                .values()
                .filter(|m| include_past_partners || m.is_open())
                .filter_map(|m| m.other_participant(user_id)),
        );

        Ok(excluded)
    }

    async fn blocked_pairs_among(&self, user_ids: &[UserId]) -> Result<HashSet<(UserId, UserId)>, StoreError> {
        let members: HashSet<UserId> = user_ids.iter().copied().collect();
        let tables = self.tables.lock().await;
        Ok(tables
            .blocked_pairs
            .iter()
            .filter(|b| members.contains(&b.blocker_id) && members.contains(&b.blocked_id))
            .map(|b| pair_key(b.blocker_id, b.blocked_id))
            .collect())
    }

    async fn block(&self, blocker_id: UserId, blocked_id: UserId, reason: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let exists = tables
            .blocked_pairs
            .iter()
            .any(|b| b.blocker_id == blocker_id && b.blocked_id == blocked_id);
        if !exists {
            tables.blocked_pairs.push(BlockedPair {
                blocker_id,
                blocked_id,
                reason: reason.to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn report(&self, reporter_id: UserId, reported_id: UserId, reason: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.next_report_id += 1;
        let report_id = tables.next_report_id;
        tables.reports.push(Report {
            report_id,
            reporter_id,
            reported_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn searching_store(ids: &[UserId]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for &id in ids {
            store.create_user(id, None).await.unwrap();
            store.set_state(id, UserState::Searching).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent() {
        let store = InMemoryStore::new();
        store.create_user(1, Some("first")).await.unwrap();
        let again = store.create_user(1, Some("second")).await.unwrap();
        assert_eq!(again.username.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_match_creation_is_idempotent_per_pair() {
        let store = searching_store(&[1, 2]).await;

        assert!(store.create_match_if_absent(1, 2).await.unwrap().is_some());
        assert!(store.create_match_if_absent(2, 1).await.unwrap().is_none());
        assert!(store.create_match_if_absent(1, 2).await.unwrap().is_none());
        assert_eq!(store.matches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_match_creation_is_at_most_once_per_user() {
        let store = searching_store(&[1, 2, 3]).await;

        let (first, second) = tokio::join!(store.create_match_if_absent(1, 2), store.create_match_if_absent(1, 3));
        let created = [first.unwrap(), second.unwrap()].into_iter().flatten().count();
        assert_eq!(created, 1);
        assert_eq!(store.matches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_pairing_requires_both_searching() {
        let store = searching_store(&[1, 2, 3]).await;
        let first = PairingCommit { user_a: 1, user_b: 2, charge_a: true, charge_b: true };
        let second = PairingCommit { user_a: 3, user_b: 2, charge_a: true, charge_b: true };

        assert!(store.commit_pairing(&first).await.unwrap().is_some());
        assert!(store.commit_pairing(&second).await.unwrap().is_none());

        let three = store.get_user(3).await.unwrap().unwrap();
        assert_eq!(three.state, UserState::Searching);
        assert_eq!(three.free_matches_used, 0);

        let two = store.get_user(2).await.unwrap().unwrap();
        assert_eq!(two.state, UserState::Chatting);
        assert!(two.search_start_time.is_none());
        assert_eq!(two.free_matches_used, 1);
    }

    #[tokio::test]
    async fn test_guarded_transition_is_noop_on_wrong_state() {
        let store = searching_store(&[1]).await;
        assert!(!store.set_state_if(1, &[UserState::Chatting], UserState::Idle).await.unwrap());
        assert_eq!(store.get_user(1).await.unwrap().unwrap().state, UserState::Searching);
    }

    #[tokio::test]
    async fn test_is_premium_downgrades_lapsed_subscription() {
        let store = InMemoryStore::new();
        store.create_user(1, None).await.unwrap();
        store
            .grant_premium(1, "1 Week", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert!(!store.is_premium(1).await.unwrap());
        let user = store.get_user(1).await.unwrap().unwrap();
        assert!(!user.is_premium);
        assert!(user.premium_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_excluded_partners_covers_both_block_directions() {
        let store = searching_store(&[1, 2, 3, 4]).await;
        store.block(1, 2, "spam").await.unwrap();
        store.block(3, 1, "rude").await.unwrap();

        let excluded = store.excluded_partners(1, false).await.unwrap();
        assert_eq!(excluded, HashSet::from([2, 3]));

        let among = store.blocked_pairs_among(&[1, 2, 4]).await.unwrap();
        assert_eq!(among, HashSet::from([(1, 2)]));
    }
}
