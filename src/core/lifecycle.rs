use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::core::quota::QuotaGate;
use crate::models::{NotificationKind, ProfileUpdate, User, UserId, UserState};
use crate::services::notifier::NotificationDispatcher;
use crate::services::store::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The user moved to this state
    Applied(UserState),
    /// Stale command; the user stays in this state
    NoOp(UserState),
    NotFound,
    /// Free allowance spent and no active premium
    PremiumRequired,
    NotInChat,
}

impl TransitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::Applied(_) => "applied",
            TransitionOutcome::NoOp(_) => "no_op",
            TransitionOutcome::NotFound => "not_found",
            TransitionOutcome::PremiumRequired => "premium_required",
            TransitionOutcome::NotInChat => "not_in_chat",
        }
    }

    pub fn state(&self) -> Option<UserState> {
        match self {
            TransitionOutcome::Applied(state) | TransitionOutcome::NoOp(state) => Some(*state),
            _ => None,
        }
    }
}

/// A user record with its derived quota standing
#[derive(Debug, Clone)]
pub struct UserStatus {
    pub user: User,
    pub premium_active: bool,
    pub free_matches_remaining: u32,
}

const RESTARTABLE: [UserState; 4] = [
    UserState::New,
    UserState::Idle,
    UserState::Onboarding,
    UserState::Searching,
];

/// Guarded user-command transitions
///
/// Every write is conditional on the state the command expects, so a
/// command racing a scheduler tick either applies cleanly or becomes a
/// no-op. The only way into `CHATTING` is the match committer.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn StateStore>,
    dispatcher: NotificationDispatcher,
    quota: QuotaGate,
}

impl LifecycleService {
    pub fn new(store: Arc<dyn StateStore>, dispatcher: NotificationDispatcher, quota: QuotaGate) -> Self {
        Self {
            store,
            dispatcher,
            quota,
        }
    }

    /// Create the user on first contact; returns the stored record either way
    pub async fn register(&self, user_id: UserId, username: Option<&str>) -> Result<User, LifecycleError> {
        let user = self.store.create_user(user_id, username).await?;
        tracing::debug!("Registered user {} ({})", user_id, user.state);
        Ok(user)
    }

    pub async fn status(&self, user_id: UserId) -> Result<Option<UserStatus>, LifecycleError> {
        let premium_active = self.store.is_premium(user_id).await?;
        // Re-read so a lazy downgrade is reflected
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(None);
        };
        let free_matches_remaining = self.quota.remaining(&user);

        Ok(Some(UserStatus {
            user,
            premium_active,
            free_matches_remaining,
        }))
    }

    /// `NEW`/`IDLE`/`ONBOARDING`/`SEARCHING`/`CHATTING` -> `ONBOARDING`
    pub async fn restart_onboarding(&self, user_id: UserId) -> Result<TransitionOutcome, LifecycleError> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };

        if user.is_blocked || user.state == UserState::Blocked {
            return Ok(TransitionOutcome::NoOp(UserState::Blocked));
        }

        if !self.store.is_premium(user_id).await? && !self.quota.has_allowance(&user) {
            tracing::info!("User {} has no free matches left, premium required", user_id);
            return Ok(TransitionOutcome::PremiumRequired);
        }

        if user.state == UserState::Chatting {
            self.leave_chat(user_id, NotificationKind::PartnerEndedChat).await?;
        }

        let mut from = RESTARTABLE.to_vec();
        from.push(UserState::Chatting);
        self.guarded(user_id, &from, UserState::Onboarding).await
    }

    /// `ONBOARDING` -> `SEARCHING` once the profile is complete
    pub async fn complete_profile(
        &self,
        user_id: UserId,
        profile: &ProfileUpdate,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };

        if user.state != UserState::Onboarding {
            return Ok(TransitionOutcome::NoOp(user.state));
        }

        self.store.update_profile(user_id, profile).await?;
        self.guarded(user_id, &[UserState::Onboarding], UserState::Searching).await
    }

    /// `SEARCHING` -> `IDLE`
    pub async fn cancel_search(&self, user_id: UserId) -> Result<TransitionOutcome, LifecycleError> {
        self.guarded(user_id, &[UserState::Searching], UserState::Idle).await
    }

    /// `CHATTING` -> `IDLE` for both participants
    pub async fn end_chat(&self, user_id: UserId) -> Result<TransitionOutcome, LifecycleError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Ok(TransitionOutcome::NotFound);
        }
        self.leave_chat(user_id, NotificationKind::PartnerEndedChat).await
    }

    /// Block and report the current partner, then end the chat
    pub async fn report_partner(&self, user_id: UserId, reason: &str) -> Result<TransitionOutcome, LifecycleError> {
        let Some(open) = self.store.get_open_match(user_id).await? else {
            return Ok(TransitionOutcome::NotInChat);
        };
        let Some(partner_id) = open.other_participant(user_id) else {
            return Ok(TransitionOutcome::NotInChat);
        };

        self.store.block(user_id, partner_id, reason).await?;
        self.store.report(user_id, partner_id, reason).await?;
        tracing::info!("User {} reported {}: {}", user_id, partner_id, reason);

        self.leave_chat(user_id, NotificationKind::ChatEndedByReport).await
    }

    /// Administrative block from any state; ends an open chat first
    pub async fn block_user(&self, user_id: UserId) -> Result<TransitionOutcome, LifecycleError> {
        if !self.store.set_blocked(user_id, true).await? {
            return Ok(TransitionOutcome::NotFound);
        }

        if self.store.get_open_match(user_id).await?.is_some() {
            self.leave_chat(user_id, NotificationKind::PartnerEndedChat).await?;
        }

        self.store.set_state(user_id, UserState::Blocked).await?;
        tracing::info!("User {} blocked", user_id);
        Ok(TransitionOutcome::Applied(UserState::Blocked))
    }

    /// `BLOCKED` -> `IDLE`
    pub async fn unblock_user(&self, user_id: UserId) -> Result<TransitionOutcome, LifecycleError> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !user.is_blocked && user.state != UserState::Blocked {
            return Ok(TransitionOutcome::NoOp(user.state));
        }

        self.store.set_blocked(user_id, false).await?;
        match self.guarded(user_id, &[UserState::Blocked], UserState::Idle).await? {
            // A block interrupted before its state change leaves only the flag behind
            TransitionOutcome::NoOp(state) if user.is_blocked => {
                tracing::info!("Cleared stale block flag for user {} in {:?}", user_id, state);
                Ok(TransitionOutcome::Applied(state))
            }
            outcome => Ok(outcome),
        }
    }

    /// Billing hook: premium for `duration_days` from now
    pub async fn grant_premium(
        &self,
        user_id: UserId,
        plan: &str,
        duration_days: u32,
    ) -> Result<Option<UserStatus>, LifecycleError> {
        let expires_at = Utc::now() + Duration::days(i64::from(duration_days));
        if !self.store.grant_premium(user_id, plan, expires_at).await? {
            return Ok(None);
        }
        tracing::info!("Granted {} premium to user {} until {}", plan, user_id, expires_at);
        self.status(user_id).await
    }

    /// End the caller's open match and move both sides to `IDLE`
    async fn leave_chat(&self, user_id: UserId, kind: NotificationKind) -> Result<TransitionOutcome, LifecycleError> {
        let Some(open) = self.store.get_open_match(user_id).await? else {
            // A chat state without a match row is left over from a crash
            if self
                .store
                .set_state_if(user_id, &[UserState::Chatting], UserState::Idle)
                .await?
            {
                return Ok(TransitionOutcome::Applied(UserState::Idle));
            }
            return Ok(TransitionOutcome::NotInChat);
        };

        let ended = self.store.end_match(open.match_id, user_id).await?;
        self.store
            .set_state_if(user_id, &[UserState::Chatting], UserState::Idle)
            .await?;

        if let Some(partner_id) = open.other_participant(user_id) {
            self.store
                .set_state_if(partner_id, &[UserState::Chatting], UserState::Idle)
                .await?;
            if ended {
                self.dispatcher.partner_left(partner_id, kind, open.match_id).await;
            }
        }

        tracing::info!("Match {} ended by user {}", open.match_id, user_id);
        Ok(TransitionOutcome::Applied(UserState::Idle))
    }

    async fn guarded(
        &self,
        user_id: UserId,
        from: &[UserState],
        to: UserState,
    ) -> Result<TransitionOutcome, LifecycleError> {
        if self.store.set_state_if(user_id, from, to).await? {
            tracing::info!("User {} -> {}", user_id, to);
            return Ok(TransitionOutcome::Applied(to));
        }

        Ok(match self.store.get_user(user_id).await? {
            Some(user) => TransitionOutcome::NoOp(user.state),
            None => TransitionOutcome::NotFound,
        })
    }
}
