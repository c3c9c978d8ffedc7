use serde::{Deserialize, Serialize};

use crate::models::domain::{Gender, User, UserId, UserState};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Public view of a user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub state: UserState,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub preference: Option<Gender>,
    pub city: Option<String>,
    #[serde(rename = "isPremium")]
    pub is_premium: bool,
    #[serde(rename = "premiumExpiresAt")]
    pub premium_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "freeMatchesUsed")]
    pub free_matches_used: u32,
    #[serde(rename = "freeMatchesRemaining")]
    pub free_matches_remaining: u32,
    #[serde(rename = "searchStartTime")]
    pub search_start_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserResponse {
    pub fn from_user(user: &User, premium_active: bool, free_matches_remaining: u32) -> Self {
        Self {
            user_id: user.user_id,
            state: user.state,
            age: user.age,
            gender: user.gender,
            preference: user.preference,
            city: user.city.clone(),
            is_premium: premium_active,
            premium_expires_at: user.premium_expires_at,
            free_matches_used: user.free_matches_used,
            free_matches_remaining,
            search_start_time: user.search_start_time,
        }
    }
}

/// Result of a lifecycle command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub outcome: String,
    pub state: Option<UserState>,
}
