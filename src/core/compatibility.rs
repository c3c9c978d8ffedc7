use crate::models::{User, UserId};
use std::collections::HashSet;

/// Stage 2 of the pipeline: may these two users be paired?
///
/// Bidirectional preference: each side's gender must be the other side's
/// stated preference. A profile missing either field is compatible with no
/// one. Hard exclusions (self, open-match partners, blocked pairs in either
/// direction) come from the store as a set of user ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityRule;

impl CompatibilityRule {
    #[inline]
    pub fn preferences_align(&self, a: &User, b: &User) -> bool {
        match (a.gender, a.preference, b.gender, b.preference) {
            (Some(a_gender), Some(a_pref), Some(b_gender), Some(b_pref)) => {
                a_gender == b_pref && b_gender == a_pref
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_compatible(&self, seeker: &User, candidate: &User, excluded: &HashSet<UserId>) -> bool {
        if candidate.user_id == seeker.user_id {
            return false;
        }

        if excluded.contains(&candidate.user_id) {
            return false;
        }

        self.preferences_align(seeker, candidate)
    }
}
