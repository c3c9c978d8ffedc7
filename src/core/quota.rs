use crate::core::eligibility::PremiumStatus;
use crate::models::{PairingCommit, User};
use chrono::{DateTime, Utc};

/// Free-tier allowance accounting
///
/// Premium users are never charged. Everyone else spends one unit of the
/// allowance per committed match; the charge itself is written by the store
/// inside the same transaction that creates the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGate {
    allowance: u32,
}

impl QuotaGate {
    pub fn new(allowance: u32) -> Self {
        Self { allowance }
    }

    pub fn allowance(&self) -> u32 {
        self.allowance
    }

    /// Free matches left, ignoring premium
    pub fn remaining(&self, user: &User) -> u32 {
        self.allowance.saturating_sub(user.free_matches_used)
    }

    pub fn has_allowance(&self, user: &User) -> bool {
        user.free_matches_used < self.allowance
    }

    /// Whether a committed match costs this user one free unit
    pub fn charges(&self, user: &User, now: DateTime<Utc>) -> bool {
        PremiumStatus::of(user, now) != PremiumStatus::Active
    }

    /// Build the commit record for a chosen pair
    pub fn pairing(&self, a: &User, b: &User, now: DateTime<Utc>) -> PairingCommit {
        PairingCommit {
            user_a: a.user_id,
            user_b: b.user_id,
            charge_a: self.charges(a, now),
            charge_b: self.charges(b, now),
        }
    }
}

impl Default for QuotaGate {
    fn default() -> Self {
        Self::new(2)
    }
}
