use crate::core::quota::QuotaGate;
use crate::models::{User, UserState};
use chrono::{DateTime, Utc};

/// Premium standing of a user at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumStatus {
    /// Flag set and expiry in the future
    Active,
    /// Flag set but the expiry passed (or was never recorded); needs a downgrade
    Expired,
    Free,
}

impl PremiumStatus {
    pub fn of(user: &User, now: DateTime<Utc>) -> Self {
        if !user.is_premium {
            PremiumStatus::Free
        } else if user.premium_active(now) {
            PremiumStatus::Active
        } else {
            PremiumStatus::Expired
        }
    }
}

/// Why a user sits out the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    NotSearching(UserState),
    Blocked,
    QuotaExhausted,
}

/// Stage 1 of the pipeline: may this user be matched right now?
#[derive(Debug, Clone, Copy)]
pub struct EligibilityFilter {
    quota: QuotaGate,
}

impl EligibilityFilter {
    pub fn new(quota: QuotaGate) -> Self {
        Self { quota }
    }

    /// Check-then-reconcile step for lapsed premium.
    ///
    /// Clears the premium fields on this snapshot copy and returns `true`
    /// when the caller must persist the downgrade. Idempotent.
    pub fn reconcile_premium(&self, user: &mut User, now: DateTime<Utc>) -> bool {
        if PremiumStatus::of(user, now) == PremiumStatus::Expired {
            user.clear_premium();
            true
        } else {
            false
        }
    }

    pub fn check(&self, user: &User, now: DateTime<Utc>) -> Result<(), Ineligible> {
        if user.state != UserState::Searching {
            return Err(Ineligible::NotSearching(user.state));
        }

        if user.is_blocked {
            return Err(Ineligible::Blocked);
        }

        if PremiumStatus::of(user, now) != PremiumStatus::Active && !self.quota.has_allowance(user) {
            return Err(Ineligible::QuotaExhausted);
        }

        Ok(())
    }

    #[inline]
    pub fn is_eligible(&self, user: &User, now: DateTime<Utc>) -> bool {
        self.check(user, now).is_ok()
    }
}
