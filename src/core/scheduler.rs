use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::core::committer::{CommitOutcome, MatchCommitter};
use crate::core::matcher::Matcher;
use crate::models::{User, UserId};
use crate::services::notifier::NotificationDispatcher;
use crate::services::store::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum TickError {
    #[error("Failed to snapshot the searching pool: {0}")]
    Snapshot(#[source] StoreError),

    #[error("Failed to load blocked pairs for batch pairing: {0}")]
    BlockedPairs(#[source] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub first_tick_delay: Duration,
    /// Pools of at least this many users are paired in batch
    pub batch_threshold: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            first_tick_delay: Duration::from_secs(config.first_tick_delay_secs),
            batch_threshold: config.batch_threshold,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Individual,
    Batch,
}

/// What one pass over the pool did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pool_size: usize,
    pub eligible: usize,
    pub strategy: Strategy,
    pub matches_created: usize,
    pub commit_races: usize,
    pub downgrades: usize,
    pub failures: usize,
    /// `MatchFound` deliveries handed off; they complete after the tick
    pub notifications_queued: usize,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>, pool_size: usize) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            pool_size,
            eligible: 0,
            strategy: Strategy::Individual,
            matches_created: 0,
            commit_races: 0,
            downgrades: 0,
            failures: 0,
            notifications_queued: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still running
    Skipped,
}

/// Holds the single-flight flag for the lifetime of a tick
struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Periodic driver of the matching pipeline
///
/// At most one tick runs at a time; a tick that comes due while another is
/// in flight is skipped rather than queued. Pairings committed before a
/// per-user failure stay committed.
pub struct Scheduler {
    store: Arc<dyn StateStore>,
    matcher: Matcher,
    committer: MatchCommitter,
    dispatcher: NotificationDispatcher,
    settings: SchedulerSettings,
    in_flight: AtomicBool,
    last_report: Mutex<Option<TickReport>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        matcher: Matcher,
        dispatcher: NotificationDispatcher,
        settings: SchedulerSettings,
    ) -> Self {
        let committer = MatchCommitter::new(store.clone(), *matcher.quota());
        Self {
            store,
            matcher,
            committer,
            dispatcher,
            settings,
            in_flight: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn is_ticking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn last_report(&self) -> Option<TickReport> {
        self.last_report.lock().await.clone()
    }

    /// Run one tick unless one is already in flight
    pub async fn try_tick(&self) -> Result<TickOutcome, TickError> {
        let Some(_guard) = TickGuard::acquire(&self.in_flight) else {
            tracing::debug!("Tick already in flight, skipping");
            return Ok(TickOutcome::Skipped);
        };

        let report = self.tick().await?;
        *self.last_report.lock().await = Some(report.clone());
        Ok(TickOutcome::Completed(report))
    }

    /// Tick on the configured cadence until `shutdown` flips to `true`
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Scheduler started: every {:?}, first tick after {:?}, batch threshold {}",
            self.settings.interval,
            self.settings.first_tick_delay,
            self.settings.batch_threshold
        );

        let start = tokio::time::Instant::now() + self.settings.first_tick_delay;
        let mut ticker = tokio::time::interval_at(start, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        match scheduler.try_tick().await {
                            Ok(TickOutcome::Completed(_)) => {}
                            Ok(TickOutcome::Skipped) => tracing::debug!("Skipped overlapping tick"),
                            Err(e) => tracing::error!("Tick failed, deferring to next interval: {}", e),
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<TickReport, TickError> {
        let clock = Instant::now();
        let now = Utc::now();

        let mut snapshot = self.store.list_searching_users().await.map_err(TickError::Snapshot)?;
        let mut report = TickReport::new(now, snapshot.len());

        for user in snapshot.iter_mut() {
            if !self.matcher.eligibility().reconcile_premium(user, now) {
                continue;
            }
            match self.store.downgrade_premium(user.user_id).await {
                Ok(_) => {
                    report.downgrades += 1;
                    tracing::info!("Premium expired for user {}, downgraded", user.user_id);
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!("Failed to downgrade premium for user {}: {}", user.user_id, e);
                }
            }
        }

        let pool: Vec<&User> = snapshot
            .iter()
            .filter(|user| self.matcher.eligibility().is_eligible(user, now))
            .collect();
        report.eligible = pool.len();

        if report.pool_size < self.settings.batch_threshold {
            report.strategy = Strategy::Individual;
            self.match_individually(&pool, now, &mut report).await;
        } else {
            report.strategy = Strategy::Batch;
            self.match_in_batch(&pool, now, &mut report).await?;
        }

        report.duration_ms = clock.elapsed().as_millis() as u64;

        if report.matches_created > 0 || report.failures > 0 {
            tracing::info!(
                pool = report.pool_size,
                eligible = report.eligible,
                strategy = ?report.strategy,
                matches = report.matches_created,
                races = report.commit_races,
                failures = report.failures,
                duration_ms = report.duration_ms,
                "Tick complete"
            );
        } else {
            tracing::debug!(pool = report.pool_size, eligible = report.eligible, "Tick complete, no matches");
        }

        Ok(report)
    }

    /// Evaluate each seeker in wait order against what is left of the pool
    async fn match_individually(&self, pool: &[&User], now: DateTime<Utc>, report: &mut TickReport) {
        let mut consumed: HashSet<UserId> = HashSet::new();
        let avoid_repeats = self.matcher.policy().avoid_repeat_partners;

        for &seeker in pool {
            if consumed.contains(&seeker.user_id) {
                continue;
            }

            let excluded = match self.store.excluded_partners(seeker.user_id, avoid_repeats).await {
                Ok(excluded) => excluded,
                Err(e) => {
                    report.failures += 1;
                    tracing::error!("Failed to load exclusions for user {}: {}", seeker.user_id, e);
                    continue;
                }
            };

            let remaining: Vec<&User> = pool
                .iter()
                .copied()
                .filter(|candidate| !consumed.contains(&candidate.user_id))
                .collect();

            let Some((partner, selection)) = self.matcher.find_partner(seeker, &remaining, &excluded, now) else {
                continue;
            };

            tracing::debug!(
                "User {} -> {} via {} tier (distance: {:?})",
                seeker.user_id,
                partner.user_id,
                selection.tier,
                selection.distance_km
            );

            self.commit_and_notify(seeker, partner, now, &mut consumed, report).await;
        }
    }

    /// Adjacent pairing by wait time; no compatibility or windows
    async fn match_in_batch(&self, pool: &[&User], now: DateTime<Utc>, report: &mut TickReport) -> Result<(), TickError> {
        let ids: Vec<UserId> = pool.iter().map(|user| user.user_id).collect();
        let blocked = self
            .store
            .blocked_pairs_among(&ids)
            .await
            .map_err(TickError::BlockedPairs)?;

        let mut consumed: HashSet<UserId> = HashSet::new();
        for (a, b) in self.matcher.pair_adjacent(pool, &blocked) {
            self.commit_and_notify(a, b, now, &mut consumed, report).await;
        }

        Ok(())
    }

    async fn commit_and_notify(
        &self,
        a: &User,
        b: &User,
        now: DateTime<Utc>,
        consumed: &mut HashSet<UserId>,
        report: &mut TickReport,
    ) {
        // Whatever happens, neither user is offered again this tick
        consumed.insert(a.user_id);
        consumed.insert(b.user_id);

        match self.committer.commit(a, b, now).await {
            Ok(CommitOutcome::Committed(record)) => {
                report.matches_created += 1;
                report.notifications_queued += record.participants().len();
                self.dispatcher.spawn_match_found(record);
            }
            Ok(CommitOutcome::AlreadyMatched) => report.commit_races += 1,
            Err(e) => {
                report.failures += 1;
                tracing::error!("Failed to commit {} <-> {}: {}", a.user_id, b.user_id, e);
            }
        }
    }
}
