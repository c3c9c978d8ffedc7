use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type MatchId = i64;

/// Lifecycle state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserState {
    New,
    Onboarding,
    Searching,
    Chatting,
    Idle,
    Blocked,
}

impl UserState {
    pub const ALL: [UserState; 6] = [
        UserState::New,
        UserState::Onboarding,
        UserState::Searching,
        UserState::Chatting,
        UserState::Idle,
        UserState::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::New => "NEW",
            UserState::Onboarding => "ONBOARDING",
            UserState::Searching => "SEARCHING",
            UserState::Chatting => "CHATTING",
            UserState::Idle => "IDLE",
            UserState::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown user state '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// User record as owned by the state store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub preference: Option<Gender>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub state: UserState,
    #[serde(rename = "isBlocked", default)]
    pub is_blocked: bool,
    #[serde(rename = "isPremium", default)]
    pub is_premium: bool,
    #[serde(rename = "premiumPlan", default)]
    pub premium_plan: Option<String>,
    #[serde(rename = "premiumExpiresAt", default)]
    pub premium_expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "freeMatchesUsed", default)]
    pub free_matches_used: u32,
    #[serde(rename = "searchStartTime", default)]
    pub search_start_time: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered user in the `NEW` state
    pub fn new(user_id: UserId, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username,
            age: None,
            gender: None,
            preference: None,
            city: None,
            latitude: None,
            longitude: None,
            state: UserState::New,
            is_blocked: false,
            is_premium: false,
            premium_plan: None,
            premium_expires_at: None,
            free_matches_used: 0,
            search_start_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both coordinates, when the user shared a location
    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// Seconds spent in the pool; zero when not searching
    pub fn wait_secs(&self, now: DateTime<Utc>) -> f64 {
        self.search_start_time
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// Whether the premium subscription is in force at `now`
    pub fn premium_active(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.map_or(false, |exp| exp > now)
    }

    /// Apply a state change in memory, keeping `search_start_time` consistent
    pub fn enter_state(&mut self, state: UserState, now: DateTime<Utc>) {
        self.search_start_time = if state == UserState::Searching {
            Some(now)
        } else {
            None
        };
        self.state = state;
        self.updated_at = now;
    }

    /// Drop premium fields after expiry
    pub fn clear_premium(&mut self) {
        self.is_premium = false;
        self.premium_plan = None;
        self.premium_expires_at = None;
    }
}

/// Profile fields collected during onboarding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub age: u8,
    pub gender: Gender,
    pub preference: Gender,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ProfileUpdate {
    pub fn apply_to(&self, user: &mut User) {
        user.age = Some(self.age);
        user.gender = Some(self.gender);
        user.preference = Some(self.preference);
        user.city = self.city.clone();
        user.latitude = self.latitude;
        user.longitude = self.longitude;
    }
}

/// A pairing between two users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "matchId")]
    pub match_id: MatchId,
    #[serde(rename = "user1Id")]
    pub user1_id: UserId,
    #[serde(rename = "user2Id")]
    pub user2_id: UserId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "endedAt", default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedBy", default)]
    pub ended_by: Option<UserId>,
}

impl Match {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// Same unordered pair, in either orientation
    pub fn is_pair(&self, a: UserId, b: UserId) -> bool {
        (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
    }

    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.user1_id, self.user2_id]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedPair {
    pub blocker_id: UserId,
    pub blocked_id: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_id: i64,
    pub reporter_id: UserId,
    pub reported_id: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the committer needs to persist one pairing atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingCommit {
    pub user_a: UserId,
    pub user_b: UserId,
    pub charge_a: bool,
    pub charge_b: bool,
}

impl PairingCommit {
    pub fn charged_users(&self) -> Vec<UserId> {
        let mut charged = Vec::with_capacity(2);
        if self.charge_a {
            charged.push(self.user_a);
        }
        if self.charge_b {
            charged.push(self.user_b);
        }
        charged
    }
}

/// Unordered key for a pair of users
pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MatchFound,
    PartnerEndedChat,
    ChatEndedByReport,
}

/// One event handed to the messaging transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchNotification {
    #[serde(rename = "eventId")]
    pub event_id: uuid::Uuid,
    #[serde(rename = "recipientId")]
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    #[serde(rename = "matchId")]
    pub match_id: Option<MatchId>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl MatchNotification {
    pub fn new(recipient_id: UserId, kind: NotificationKind, match_id: Option<MatchId>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            recipient_id,
            kind,
            match_id,
            created_at: Utc::now(),
        }
    }
}

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Tunables of the matching pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub free_match_allowance: u32,
    pub locality_window_secs: f64,
    pub nearby_radius_km: f64,
    pub regional_radius_km: f64,
    pub avoid_repeat_partners: bool,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            free_match_allowance: 2,
            locality_window_secs: 30.0,
            nearby_radius_km: 50.0,
            regional_radius_km: 300.0,
            avoid_repeat_partners: false,
        }
    }
}
