use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::quota::QuotaGate;
use crate::models::{Match, User};
use crate::services::store::{StateStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(Match),
    /// Lost a race: one of the users is no longer available
    AlreadyMatched,
}

/// Turns a chosen pair into a persisted match
///
/// Quota charges are decided from the snapshot the pair was chosen from;
/// the store applies them in the same transaction as the match insert and
/// both state flips.
#[derive(Clone)]
pub struct MatchCommitter {
    store: Arc<dyn StateStore>,
    quota: QuotaGate,
}

impl MatchCommitter {
    pub fn new(store: Arc<dyn StateStore>, quota: QuotaGate) -> Self {
        Self { store, quota }
    }

    pub async fn commit(&self, a: &User, b: &User, now: DateTime<Utc>) -> Result<CommitOutcome, StoreError> {
        let pairing = self.quota.pairing(a, b, now);

        match self.store.commit_pairing(&pairing).await? {
            Some(record) => {
                tracing::info!(
                    "Match {} created: {} <-> {} (charged: {:?})",
                    record.match_id,
                    a.user_id,
                    b.user_id,
                    pairing.charged_users()
                );
                Ok(CommitOutcome::Committed(record))
            }
            None => {
                tracing::debug!("Commit of {} <-> {} refused", a.user_id, b.user_id);
                Ok(CommitOutcome::AlreadyMatched)
            }
        }
    }
}
