// Integration tests for Mystery Match: scheduler, committer and lifecycle
// running against the in-memory store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mystery_match::core::{
    LifecycleService, Matcher, Scheduler, SchedulerSettings, Strategy, TickOutcome, TickReport, TransitionOutcome,
};
use mystery_match::models::{
    Gender, Match, MatchId, MatchNotification, MatchPolicy, NotificationKind, PairingCommit, ProfileUpdate, User,
    UserId, UserState,
};
use mystery_match::services::{
    InMemoryStore, NotificationDispatcher, Notifier, NotifyError, RetryPolicy, RetryingStore, StateStore, StoreError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const MUMBAI: (&str, f64, f64) = ("Mumbai", 19.0760, 72.8777);

/// Keeps every notification handed to the transport
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<MatchNotification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<MatchNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &MatchNotification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Transport that never answers
struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn deliver(&self, _notification: &MatchNotification) -> Result<(), NotifyError> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(())
    }
}

/// In-memory store with injectable latency and failures
struct ScriptedStore {
    inner: InMemoryStore,
    snapshot_delay: std::time::Duration,
    failing_users: HashSet<UserId>,
    /// Next commit lands but its acknowledgement is lost
    drop_next_commit_ack: AtomicBool,
}

impl ScriptedStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            snapshot_delay: std::time::Duration::ZERO,
            failing_users: HashSet::new(),
            drop_next_commit_ack: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StateStore for ScriptedStore {
    async fn create_user(&self, user_id: UserId, username: Option<&str>) -> Result<User, StoreError> {
        self.inner.create_user(user_id, username).await
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn update_profile(&self, user_id: UserId, profile: &ProfileUpdate) -> Result<bool, StoreError> {
        self.inner.update_profile(user_id, profile).await
    }

    async fn set_state_if(&self, user_id: UserId, from: &[UserState], to: UserState) -> Result<bool, StoreError> {
        self.inner.set_state_if(user_id, from, to).await
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<bool, StoreError> {
        self.inner.set_blocked(user_id, blocked).await
    }

    async fn list_searching_users(&self) -> Result<Vec<User>, StoreError> {
        tokio::time::sleep(self.snapshot_delay).await;
        self.inner.list_searching_users().await
    }

    async fn grant_premium(&self, user_id: UserId, plan: &str, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.grant_premium(user_id, plan, expires_at).await
    }

    async fn downgrade_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.inner.downgrade_premium(user_id).await
    }

    async fn increment_free_matches(&self, user_id: UserId) -> Result<(), StoreError> {
        self.inner.increment_free_matches(user_id).await
    }

    async fn create_match_if_absent(&self, user_a: UserId, user_b: UserId) -> Result<Option<MatchId>, StoreError> {
        self.inner.create_match_if_absent(user_a, user_b).await
    }

    async fn commit_pairing(&self, commit: &PairingCommit) -> Result<Option<Match>, StoreError> {
        if self.failing_users.contains(&commit.user_a) || self.failing_users.contains(&commit.user_b) {
            return Err(StoreError::InvalidData("corrupt row".into()));
        }
        let outcome = self.inner.commit_pairing(commit).await?;
        if self.drop_next_commit_ack.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset after commit".into()));
        }
        Ok(outcome)
    }

    async fn get_open_match(&self, user_id: UserId) -> Result<Option<Match>, StoreError> {
        self.inner.get_open_match(user_id).await
    }

    async fn end_match(&self, match_id: MatchId, ended_by: UserId) -> Result<bool, StoreError> {
        self.inner.end_match(match_id, ended_by).await
    }

    async fn other_participant(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>, StoreError> {
        self.inner.other_participant(match_id, user_id).await
    }

    async fn excluded_partners(
        &self,
        user_id: UserId,
        include_past_partners: bool,
    ) -> Result<HashSet<UserId>, StoreError> {
        self.inner.excluded_partners(user_id, include_past_partners).await
    }

    async fn blocked_pairs_among(&self, user_ids: &[UserId]) -> Result<HashSet<(UserId, UserId)>, StoreError> {
        self.inner.blocked_pairs_among(user_ids).await
    }

    async fn block(&self, blocker_id: UserId, blocked_id: UserId, reason: &str) -> Result<(), StoreError> {
        self.inner.block(blocker_id, blocked_id, reason).await
    }

    async fn report(&self, reporter_id: UserId, reported_id: UserId, reason: &str) -> Result<(), StoreError> {
        self.inner.report(reporter_id, reported_id, reason).await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.inner.health_check().await
    }
}

fn searching_user(
    id: UserId,
    gender: Gender,
    preference: Gender,
    location: Option<(&str, f64, f64)>,
    waited_secs: i64,
) -> User {
    let now = Utc::now();
    let mut user = User::new(id, None, now);
    user.age = Some(30);
    user.gender = Some(gender);
    user.preference = Some(preference);
    if let Some((city, lat, lon)) = location {
        user.city = Some(city.to_string());
        user.latitude = Some(lat);
        user.longitude = Some(lon);
    }
    user.enter_state(UserState::Searching, now - Duration::seconds(waited_secs));
    user
}

fn build_scheduler(store: Arc<dyn StateStore>, notifier: Arc<RecordingNotifier>, policy: MatchPolicy) -> Scheduler {
    Scheduler::new(
        store,
        Matcher::new(policy),
        NotificationDispatcher::new(notifier, std::time::Duration::from_secs(1)),
        SchedulerSettings::default(),
    )
}

async fn tick(scheduler: &Scheduler) -> TickReport {
    match scheduler.try_tick().await.unwrap() {
        TickOutcome::Completed(report) => report,
        TickOutcome::Skipped => panic!("tick unexpectedly skipped"),
    }
}

/// Deliveries run off the tick, so give them a moment to land
async fn wait_for_sent(notifier: &RecordingNotifier, count: usize) -> Vec<MatchNotification> {
    for _ in 0..100 {
        let sent = notifier.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    notifier.sent()
}

/// Every user appears in at most one open match
fn assert_no_double_match(matches: &[Match]) {
    let mut seen = HashSet::new();
    for record in matches.iter().filter(|m| m.is_open()) {
        for user_id in record.participants() {
            assert!(seen.insert(user_id), "user {} has two open matches", user_id);
        }
    }
}

#[tokio::test]
async fn test_same_city_pairing_scenario() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    // C sits about 40 km away under a different city label
    store.put_user(searching_user(1, Gender::Male, Gender::Female, Some(MUMBAI), 10)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, Some(MUMBAI), 5)).await;
    store
        .put_user(searching_user(3, Gender::Female, Gender::Male, Some(("Delhi", 19.33, 73.15)), 2))
        .await;

    let scheduler = build_scheduler(store.clone(), notifier.clone(), MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.strategy, Strategy::Individual);
    assert_eq!(report.matches_created, 1);

    let matches = store.matches().await;
    assert_eq!(matches.len(), 1);
    assert!(matches[0].is_pair(1, 2));
    assert_eq!(store.get_user(3).await.unwrap().unwrap().state, UserState::Searching);

    assert_eq!(report.notifications_queued, 2);
    let sent = wait_for_sent(&notifier, 2).await;
    let recipients: HashSet<UserId> = sent.iter().map(|n| n.recipient_id).collect();
    assert_eq!(recipients, HashSet::from([1, 2]));
    assert!(sent.iter().all(|n| n.kind == NotificationKind::MatchFound));
}

#[tokio::test]
async fn test_large_pool_uses_batch_strategy() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    for id in 1..=150 {
        let gender = if id % 2 == 0 { Gender::Female } else { Gender::Male };
        store.put_user(searching_user(id, gender, Gender::Female, None, 300 - id)).await;
    }

    let scheduler = build_scheduler(store.clone(), notifier.clone(), MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.strategy, Strategy::Batch);
    assert_eq!(report.matches_created, 75);

    let matches = store.matches().await;
    assert_eq!(matches.len(), 75);
    assert_no_double_match(&matches);

    for id in 1..=150 {
        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.state, UserState::Chatting);
        assert_eq!(user.free_matches_used, 1);
        assert!(user.search_start_time.is_none());
    }
    assert_eq!(wait_for_sent(&notifier, 150).await.len(), 150);
}

#[tokio::test]
async fn test_batch_strategy_never_pairs_blocked_users() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    for id in 1..=100 {
        store.put_user(searching_user(id, Gender::Male, Gender::Male, None, 200 - id)).await;
    }
    // Users 1 and 2 are adjacent in wait order
    store.block(2, 1, "harassment").await.unwrap();

    let scheduler = build_scheduler(store.clone(), notifier, MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.strategy, Strategy::Batch);
    assert_eq!(report.matches_created, 49);
    assert!(store.matches().await.iter().all(|m| !m.is_pair(1, 2)));
}

#[tokio::test]
async fn test_concurrent_ticks_never_double_match() {
    let store = Arc::new(InMemoryStore::new());
    for id in 1..=40 {
        let (gender, preference) = if id % 2 == 0 {
            (Gender::Female, Gender::Male)
        } else {
            (Gender::Male, Gender::Female)
        };
        store.put_user(searching_user(id, gender, preference, Some(MUMBAI), id % 20)).await;
    }

    // Two engine instances sharing one store, as in a multi-process deployment
    let first = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());
    let second = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());

    let (a, b) = tokio::join!(tick(&first), tick(&second));

    let matches = store.matches().await;
    assert_no_double_match(&matches);
    assert_eq!(a.matches_created + b.matches_created, matches.len());

    // Anyone left over by a lost race is picked up on the next pass
    tick(&first).await;
    let matches = store.matches().await;
    assert_no_double_match(&matches);
    assert_eq!(matches.len(), 20);
}

#[tokio::test]
async fn test_repeated_ticks_leave_matched_users_alone() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    store.put_user(searching_user(1, Gender::Male, Gender::Female, None, 20)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;

    let scheduler = build_scheduler(store.clone(), notifier.clone(), MatchPolicy::default());
    assert_eq!(tick(&scheduler).await.matches_created, 1);

    let second = tick(&scheduler).await;
    assert_eq!(second.pool_size, 0);
    assert_eq!(second.matches_created, 0);
    assert_eq!(store.matches().await.len(), 1);
    assert_eq!(wait_for_sent(&notifier, 2).await.len(), 2);
}

#[tokio::test]
async fn test_quota_is_monotonic_and_premium_is_free() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build_scheduler(store.clone(), notifier.clone(), MatchPolicy::default());
    let lifecycle = LifecycleService::new(
        store.clone(),
        NotificationDispatcher::new(notifier, std::time::Duration::from_secs(1)),
        *Matcher::default().quota(),
    );

    let mut spender = searching_user(1, Gender::Male, Gender::Female, None, 30);
    spender.free_matches_used = 1;
    store.put_user(spender).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;

    assert_eq!(tick(&scheduler).await.matches_created, 1);
    assert_eq!(store.get_user(1).await.unwrap().unwrap().free_matches_used, 2);

    // Allowance spent: back in the pool but never matched
    lifecycle.end_chat(1).await.unwrap();
    store.set_state(1, UserState::Searching).await.unwrap();
    store.put_user(searching_user(3, Gender::Female, Gender::Male, None, 5)).await;

    let report = tick(&scheduler).await;
    assert_eq!(report.eligible, 1);
    assert_eq!(report.matches_created, 0);

    // Premium lifts the gate without spending anything
    lifecycle.grant_premium(1, "monthly", 30).await.unwrap().unwrap();
    assert_eq!(tick(&scheduler).await.matches_created, 1);

    let spender = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(spender.free_matches_used, 2);
    assert_eq!(spender.state, UserState::Chatting);
    assert_eq!(store.get_user(3).await.unwrap().unwrap().free_matches_used, 1);
}

#[tokio::test]
async fn test_expired_premium_is_downgraded_during_tick() {
    let store = Arc::new(InMemoryStore::new());
    let mut lapsed = searching_user(1, Gender::Male, Gender::Female, None, 30);
    lapsed.free_matches_used = 2;
    lapsed.is_premium = true;
    lapsed.premium_plan = Some("weekly".to_string());
    lapsed.premium_expires_at = Some(Utc::now() - Duration::days(1));
    store.put_user(lapsed).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;

    let scheduler = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.downgrades, 1);
    assert_eq!(report.matches_created, 0);

    let user = store.get_user(1).await.unwrap().unwrap();
    assert!(!user.is_premium);
    assert!(user.premium_plan.is_none());
}

#[tokio::test]
async fn test_fallback_pairs_users_without_location() {
    let store = Arc::new(InMemoryStore::new());
    store.put_user(searching_user(1, Gender::Male, Gender::Female, Some(MUMBAI), 90)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 1)).await;

    let scheduler = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());
    assert_eq!(tick(&scheduler).await.matches_created, 1);
    assert!(store.matches().await[0].is_pair(1, 2));
}

#[tokio::test]
async fn test_blocked_pair_is_never_matched_individually() {
    let store = Arc::new(InMemoryStore::new());
    store.put_user(searching_user(1, Gender::Male, Gender::Female, None, 20)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;
    store.block(2, 1, "reported").await.unwrap();

    let scheduler = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.eligible, 2);
    assert_eq!(report.matches_created, 0);
}

#[tokio::test]
async fn test_repeat_partners_avoided_when_enabled() {
    let store = Arc::new(InMemoryStore::new());
    let lifecycle = LifecycleService::new(store.clone(), NotificationDispatcher::default(), *Matcher::default().quota());
    let policy = MatchPolicy {
        avoid_repeat_partners: true,
        ..MatchPolicy::default()
    };
    let scheduler = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), policy);

    store.put_user(searching_user(1, Gender::Male, Gender::Female, None, 20)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;
    assert_eq!(tick(&scheduler).await.matches_created, 1);

    lifecycle.end_chat(1).await.unwrap();
    for id in [1, 2] {
        store.set_state(id, UserState::Searching).await.unwrap();
    }

    assert_eq!(tick(&scheduler).await.matches_created, 0);
}

#[tokio::test]
async fn test_tick_is_skipped_while_another_runs() {
    let mut scripted = ScriptedStore::new();
    scripted.snapshot_delay = std::time::Duration::from_millis(200);
    let store: Arc<dyn StateStore> = Arc::new(scripted);
    let scheduler = Arc::new(build_scheduler(
        store,
        Arc::new(RecordingNotifier::default()),
        MatchPolicy::default(),
    ));

    let running = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.try_tick().await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(scheduler.is_ticking());
    assert!(matches!(scheduler.try_tick().await.unwrap(), TickOutcome::Skipped));

    assert!(matches!(running.await.unwrap().unwrap(), TickOutcome::Completed(_)));
    assert!(!scheduler.is_ticking());
}

#[tokio::test]
async fn test_failure_on_one_pair_does_not_undo_others() {
    let mut scripted = ScriptedStore::new();
    scripted.failing_users.insert(1);
    scripted.inner.put_user(searching_user(1, Gender::Male, Gender::Female, None, 40)).await;
    scripted.inner.put_user(searching_user(2, Gender::Female, Gender::Male, None, 30)).await;
    scripted.inner.put_user(searching_user(3, Gender::Male, Gender::Female, None, 20)).await;
    scripted.inner.put_user(searching_user(4, Gender::Female, Gender::Male, None, 10)).await;
    let scripted = Arc::new(scripted);

    let scheduler = build_scheduler(scripted.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());
    let report = tick(&scheduler).await;

    assert_eq!(report.failures, 1);
    assert_eq!(report.matches_created, 1);

    let matches = scripted.inner.matches().await;
    assert_eq!(matches.len(), 1);
    assert!(matches[0].is_pair(3, 4));
    // Users touched by the failed commit stay in the pool for the next tick
    assert_eq!(scripted.get_user(2).await.unwrap().unwrap().state, UserState::Searching);
}

#[tokio::test]
async fn test_full_lifecycle_flow() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = NotificationDispatcher::new(notifier.clone(), std::time::Duration::from_secs(1));
    let lifecycle = LifecycleService::new(store.clone(), dispatcher, *Matcher::default().quota());
    let scheduler = build_scheduler(store.clone(), notifier.clone(), MatchPolicy::default());

    let profiles: HashMap<UserId, ProfileUpdate> = HashMap::from([
        (
            10,
            ProfileUpdate {
                age: 24,
                gender: Gender::Male,
                preference: Gender::Female,
                city: Some("Mumbai".to_string()),
                latitude: Some(MUMBAI.1),
                longitude: Some(MUMBAI.2),
            },
        ),
        (
            20,
            ProfileUpdate {
                age: 27,
                gender: Gender::Female,
                preference: Gender::Male,
                city: None,
                latitude: None,
                longitude: None,
            },
        ),
    ]);

    for (&id, profile) in &profiles {
        lifecycle.register(id, None).await.unwrap();
        lifecycle.restart_onboarding(id).await.unwrap();
        assert_eq!(
            lifecycle.complete_profile(id, profile).await.unwrap(),
            TransitionOutcome::Applied(UserState::Searching)
        );
    }

    assert_eq!(tick(&scheduler).await.matches_created, 1);
    assert_eq!(store.get_user(10).await.unwrap().unwrap().state, UserState::Chatting);
    wait_for_sent(&notifier, 2).await;

    // No direct way back into the pool from a chat
    assert_eq!(
        lifecycle.cancel_search(10).await.unwrap(),
        TransitionOutcome::NoOp(UserState::Chatting)
    );

    assert_eq!(lifecycle.end_chat(20).await.unwrap(), TransitionOutcome::Applied(UserState::Idle));
    assert_eq!(store.get_user(10).await.unwrap().unwrap().state, UserState::Idle);

    let kinds: Vec<(UserId, NotificationKind)> = notifier.sent().iter().map(|n| (n.recipient_id, n.kind)).collect();
    assert_eq!(kinds.iter().filter(|(_, k)| *k == NotificationKind::MatchFound).count(), 2);
    assert!(kinds.contains(&(10, NotificationKind::PartnerEndedChat)));

    // Restart from IDLE goes back through onboarding
    assert_eq!(
        lifecycle.restart_onboarding(10).await.unwrap(),
        TransitionOutcome::Applied(UserState::Onboarding)
    );
}

#[tokio::test]
async fn test_restart_from_chat_notifies_partner() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = NotificationDispatcher::new(notifier.clone(), std::time::Duration::from_secs(1));
    let lifecycle = LifecycleService::new(store.clone(), dispatcher, *Matcher::default().quota());
    let scheduler = build_scheduler(store.clone(), Arc::new(RecordingNotifier::default()), MatchPolicy::default());

    store.put_user(searching_user(1, Gender::Male, Gender::Female, None, 20)).await;
    store.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;
    assert_eq!(tick(&scheduler).await.matches_created, 1);

    assert_eq!(
        lifecycle.restart_onboarding(1).await.unwrap(),
        TransitionOutcome::Applied(UserState::Onboarding)
    );
    assert_eq!(store.get_user(2).await.unwrap().unwrap().state, UserState::Idle);
    assert!(store.get_open_match(2).await.unwrap().is_none());

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_id, 2);
    assert_eq!(sent[0].kind, NotificationKind::PartnerEndedChat);
}

#[tokio::test]
async fn test_commit_with_lost_ack_still_notifies_both() {
    let scripted = ScriptedStore::new();
    scripted.inner.put_user(searching_user(1, Gender::Male, Gender::Female, None, 20)).await;
    scripted.inner.put_user(searching_user(2, Gender::Female, Gender::Male, None, 10)).await;
    scripted.drop_next_commit_ack.store(true, Ordering::SeqCst);

    let policy = RetryPolicy {
        max_attempts: 3,
        initial_backoff: std::time::Duration::from_millis(1),
        max_backoff: std::time::Duration::from_millis(4),
    };
    let retrying = Arc::new(RetryingStore::new(scripted, policy));
    let scripted = retrying.inner();
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = build_scheduler(retrying.clone(), notifier.clone(), MatchPolicy::default());

    let report = tick(&scheduler).await;
    assert_eq!(report.matches_created, 1);
    assert_eq!(report.commit_races, 0);

    let matches = scripted.inner.matches().await;
    assert_eq!(matches.len(), 1);
    for id in [1, 2] {
        let user = scripted.inner.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.state, UserState::Chatting);
        // The replay must not charge twice
        assert_eq!(user.free_matches_used, 1);
    }

    let sent = wait_for_sent(&notifier, 2).await;
    let recipients: HashSet<UserId> = sent.iter().map(|n| n.recipient_id).collect();
    assert_eq!(recipients, HashSet::from([1, 2]));
    assert!(sent.iter().all(|n| n.kind == NotificationKind::MatchFound && n.match_id == Some(matches[0].match_id)));
}

#[tokio::test]
async fn test_stalled_transport_does_not_hold_up_the_tick() {
    let store = Arc::new(InMemoryStore::new());
    for id in 1..=150 {
        store.put_user(searching_user(id, Gender::Male, Gender::Female, None, 300 - id)).await;
    }

    let scheduler = Scheduler::new(
        store.clone(),
        Matcher::default(),
        NotificationDispatcher::new(Arc::new(StalledNotifier), std::time::Duration::from_secs(30)),
        SchedulerSettings::default(),
    );

    let started = std::time::Instant::now();
    let report = tick(&scheduler).await;

    assert_eq!(report.matches_created, 75);
    assert_eq!(report.notifications_queued, 150);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
