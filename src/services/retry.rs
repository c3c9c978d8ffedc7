use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::RetrySettings;
use crate::models::{Match, MatchId, PairingCommit, ProfileUpdate, User, UserId, UserState};
use crate::services::store::{StateStore, StoreError};

/// Bounded exponential backoff for store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Run `f` until it succeeds, fails permanently, or attempts run out
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    "Store call {} failed (attempt {}/{}), retrying in {:?}: {}",
                    op,
                    attempt,
                    policy.max_attempts,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Store decorator that retries transient failures of the wrapped store
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: StateStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StateStore> StateStore for RetryingStore<S> {
    async fn create_user(&self, user_id: UserId, username: Option<&str>) -> Result<User, StoreError> {
        retry(&self.policy, "create_user", move || self.inner.create_user(user_id, username)).await
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        retry(&self.policy, "get_user", move || self.inner.get_user(user_id)).await
    }

    async fn update_profile(&self, user_id: UserId, profile: &ProfileUpdate) -> Result<bool, StoreError> {
        retry(&self.policy, "update_profile", move || self.inner.update_profile(user_id, profile)).await
    }

    async fn set_state_if(&self, user_id: UserId, from: &[UserState], to: UserState) -> Result<bool, StoreError> {
        retry(&self.policy, "set_state_if", move || self.inner.set_state_if(user_id, from, to)).await
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<bool, StoreError> {
        retry(&self.policy, "set_blocked", move || self.inner.set_blocked(user_id, blocked)).await
    }

    async fn list_searching_users(&self) -> Result<Vec<User>, StoreError> {
        retry(&self.policy, "list_searching_users", move || self.inner.list_searching_users()).await
    }

    async fn grant_premium(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        retry(&self.policy, "grant_premium", move || {
            self.inner.grant_premium(user_id, plan, expires_at)
        })
        .await
    }

    async fn downgrade_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        retry(&self.policy, "downgrade_premium", move || self.inner.downgrade_premium(user_id)).await
    }

    // Not idempotent, so a lost acknowledgement must not be replayed
    async fn increment_free_matches(&self, user_id: UserId) -> Result<(), StoreError> {
        self.inner.increment_free_matches(user_id).await
    }

    async fn create_match_if_absent(&self, user_a: UserId, user_b: UserId) -> Result<Option<MatchId>, StoreError> {
        retry(&self.policy, "create_match_if_absent", move || {
            self.inner.create_match_if_absent(user_a, user_b)
        })
        .await
    }

    // An error can surface after the transaction committed, so a replay that
    // finds the pair already taken checks whether the open match is its own
    async fn commit_pairing(&self, commit: &PairingCommit) -> Result<Option<Match>, StoreError> {
        let attempts = AtomicU32::new(0);
        let outcome = retry(&self.policy, "commit_pairing", || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.inner.commit_pairing(commit)
        })
        .await?;

        match outcome {
            None if attempts.load(Ordering::Relaxed) > 1 => {
                let open = self.get_open_match(commit.user_a).await?;
                let recovered = open.filter(|record| record.is_pair(commit.user_a, commit.user_b));
                if let Some(record) = &recovered {
                    tracing::warn!(
                        "Commit of {} <-> {} landed before its error, recovered match {}",
                        commit.user_a,
                        commit.user_b,
                        record.match_id
                    );
                }
                Ok(recovered)
            }
            outcome => Ok(outcome),
        }
    }

    async fn get_open_match(&self, user_id: UserId) -> Result<Option<Match>, StoreError> {
        retry(&self.policy, "get_open_match", move || self.inner.get_open_match(user_id)).await
    }

    async fn end_match(&self, match_id: MatchId, ended_by: UserId) -> Result<bool, StoreError> {
        retry(&self.policy, "end_match", move || self.inner.end_match(match_id, ended_by)).await
    }

    async fn other_participant(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>, StoreError> {
        retry(&self.policy, "other_participant", move || {
            self.inner.other_participant(match_id, user_id)
        })
        .await
    }

    async fn excluded_partners(
        &self,
        user_id: UserId,
        include_past_partners: bool,
    ) -> Result<HashSet<UserId>, StoreError> {
        retry(&self.policy, "excluded_partners", move || {
            self.inner.excluded_partners(user_id, include_past_partners)
        })
        .await
    }

    async fn blocked_pairs_among(&self, user_ids: &[UserId]) -> Result<HashSet<(UserId, UserId)>, StoreError> {
        retry(&self.policy, "blocked_pairs_among", move || self.inner.blocked_pairs_among(user_ids)).await
    }

    async fn block(&self, blocker_id: UserId, blocked_id: UserId, reason: &str) -> Result<(), StoreError> {
        retry(&self.policy, "block", move || self.inner.block(blocker_id, blocked_id, reason)).await
    }

    async fn report(&self, reporter_id: UserId, reported_id: UserId, reason: &str) -> Result<(), StoreError> {
        self.inner.report(reporter_id, reported_id, reason).await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.inner.health_check().await
    }
}
