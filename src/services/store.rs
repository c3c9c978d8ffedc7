use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{Match, MatchId, PairingCommit, ProfileUpdate, User, UserId, UserState};

/// Errors that can occur when talking to the state store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::SqlxError(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => true,
                // serialization_failure, deadlock_detected
                sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
                _ => false,
            },
            StoreError::Unavailable(_) => true,
            StoreError::MigrateError(_) | StoreError::InvalidData(_) => false,
        }
    }
}

/// Authoritative store for users, matches, blocks and reports
///
/// Implementations must make `create_match_if_absent` and `commit_pairing`
/// at-most-once per user: neither may ever leave a user with two open
/// matches, whatever the interleaving of callers.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a `NEW` user if absent and return the stored record
    async fn create_user(&self, user_id: UserId, username: Option<&str>) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// Write onboarding profile fields; does not touch the state
    async fn update_profile(&self, user_id: UserId, profile: &ProfileUpdate) -> Result<bool, StoreError>;

    /// Guarded transition: applies only when the current state is in `from`.
    ///
    /// Entering `SEARCHING` stamps `search_start_time`, any other target
    /// clears it. Returns whether the row changed.
    async fn set_state_if(&self, user_id: UserId, from: &[UserState], to: UserState) -> Result<bool, StoreError>;

    /// Unconditional transition
    async fn set_state(&self, user_id: UserId, to: UserState) -> Result<bool, StoreError> {
        self.set_state_if(user_id, &UserState::ALL, to).await
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<bool, StoreError>;

    /// Searching, non-blocked users ordered by ascending `search_start_time`
    async fn list_searching_users(&self) -> Result<Vec<User>, StoreError>;

    /// Premium check with lazy reconciliation of a lapsed subscription
    async fn is_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        let now = Utc::now();
        let Some(user) = self.get_user(user_id).await? else {
            return Ok(false);
        };
        if user.premium_active(now) {
            return Ok(true);
        }
        if user.is_premium {
            self.downgrade_premium(user_id).await?;
        }
        Ok(false)
    }

    async fn grant_premium(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Clear premium fields; idempotent
    async fn downgrade_premium(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn increment_free_matches(&self, user_id: UserId) -> Result<(), StoreError>;

    /// Insert a match unless the unordered pair, or either user, already has
    /// an open one. `None` means the insert was refused.
    async fn create_match_if_absent(&self, user_a: UserId, user_b: UserId) -> Result<Option<MatchId>, StoreError>;

    /// Match insert, quota charges and both `SEARCHING -> CHATTING` flips
    /// as one atomic unit. `None` when either user is no longer searching or
    /// the match insert was refused; nothing is written in that case.
    async fn commit_pairing(&self, commit: &PairingCommit) -> Result<Option<Match>, StoreError>;

    async fn get_open_match(&self, user_id: UserId) -> Result<Option<Match>, StoreError>;

    /// Close an open match; `false` if it was already ended
    async fn end_match(&self, match_id: MatchId, ended_by: UserId) -> Result<bool, StoreError>;

    async fn other_participant(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>, StoreError>;

    /// Users `user_id` must not be paired with: blocked in either direction
    /// and open-match partners, plus every past partner when
    /// `include_past_partners` is set.
    async fn excluded_partners(
        &self,
        user_id: UserId,
        include_past_partners: bool,
    ) -> Result<HashSet<UserId>, StoreError>;

    /// Blocked pairs with both ends in `user_ids`, as unordered keys
    async fn blocked_pairs_among(&self, user_ids: &[UserId]) -> Result<HashSet<(UserId, UserId)>, StoreError>;

    async fn block(&self, blocker_id: UserId, blocked_id: UserId, reason: &str) -> Result<(), StoreError>;

    async fn report(&self, reporter_id: UserId, reported_id: UserId, reason: &str) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}
