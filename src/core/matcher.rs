use crate::core::{
    compatibility::CompatibilityRule,
    eligibility::EligibilityFilter,
    quota::QuotaGate,
    window::{wait_order, PriorityWindowEvaluator, Selection},
};
use crate::models::{pair_key, MatchPolicy, User, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Main matching orchestrator - the pure part of a scheduler tick
///
/// # Pipeline Stages
/// 1. Eligibility (state, block flag, premium or free allowance)
/// 2. Compatibility (bidirectional preference, hard exclusions)
/// 3. Priority windows (same city, nearby, regional, fallback)
///
/// The quota gate rides along so the committer charges exactly what the
/// eligibility stage assumed.
#[derive(Debug, Clone)]
pub struct Matcher {
    policy: MatchPolicy,
    quota: QuotaGate,
    eligibility: EligibilityFilter,
    compatibility: CompatibilityRule,
    windows: PriorityWindowEvaluator,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        let quota = QuotaGate::new(policy.free_match_allowance);
        Self {
            policy,
            quota,
            eligibility: EligibilityFilter::new(quota),
            compatibility: CompatibilityRule,
            windows: PriorityWindowEvaluator::new(&policy),
        }
    }

    pub fn with_default_policy() -> Self {
        Self::new(MatchPolicy::default())
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    pub fn eligibility(&self) -> &EligibilityFilter {
        &self.eligibility
    }

    /// Pick a partner for `seeker` out of `pool`
    ///
    /// `pool` is the remaining pool for this tick; it may contain the seeker
    /// and users that turned ineligible, both are filtered here.
    /// `excluded` holds the seeker's open-match partners and blocked users.
    pub fn find_partner<'a>(
        &self,
        seeker: &User,
        pool: &[&'a User],
        excluded: &HashSet<UserId>,
        now: DateTime<Utc>,
    ) -> Option<(&'a User, Selection)> {
        if !self.eligibility.is_eligible(seeker, now) {
            return None;
        }

        let compatible: Vec<&'a User> = pool
            .iter()
            .copied()
            // Stage 1: candidate must itself be matchable
            .filter(|candidate| self.eligibility.is_eligible(candidate, now))
            // Stage 2: mutual preference and hard exclusions
            .filter(|candidate| self.compatibility.is_compatible(seeker, candidate, excluded))
            .collect();

        if compatible.is_empty() {
            tracing::debug!("No compatible candidates for user {}", seeker.user_id);
            return None;
        }

        // Stage 3: locality windows
        let selection = self.windows.select(seeker, &compatible, now)?;
        let partner = compatible
            .into_iter()
            .find(|candidate| candidate.user_id == selection.partner_id)?;

        Some((partner, selection))
    }

    /// Throughput path for large pools
    ///
    /// Sorts by wait time once and pairs neighbours (0-1, 2-3, ...) without
    /// running compatibility or locality windows. Blocked pairs are still
    /// never produced: when neighbours are blocked the left one is skipped
    /// and pairing resumes one position later.
    pub fn pair_adjacent<'a>(
        &self,
        pool: &[&'a User],
        blocked: &HashSet<(UserId, UserId)>,
    ) -> Vec<(&'a User, &'a User)> {
        let mut ordered: Vec<&'a User> = pool.to_vec();
        ordered.sort_by(|a, b| wait_order(a, b));

        let mut pairs = Vec::with_capacity(ordered.len() / 2);
        let mut i = 0;
        while i + 1 < ordered.len() {
            let (a, b) = (ordered[i], ordered[i + 1]);
            if blocked.contains(&pair_key(a.user_id, b.user_id)) {
                i += 1;
                continue;
            }
            pairs.push((a, b));
            i += 2;
        }

        pairs
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_default_policy()
    }
}
