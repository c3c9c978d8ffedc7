use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::domain::{Gender, ProfileUpdate, UserId};

/// Request to register a user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(range(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: UserId,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub username: Option<String>,
}

/// Profile collected at the end of onboarding
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_location"))]
pub struct CompleteProfileRequest {
    #[validate(range(min = 18, max = 100))]
    pub age: u8,
    pub gender: Gender,
    pub preference: Gender,
    #[validate(length(min = 1, max = 100))]
    #[serde(default)]
    pub city: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Coordinates come as a pair or not at all
fn validate_location(req: &CompleteProfileRequest) -> Result<(), ValidationError> {
    if req.latitude.is_some() != req.longitude.is_some() {
        return Err(ValidationError::new("latitude_and_longitude_required_together"));
    }
    Ok(())
}

impl From<CompleteProfileRequest> for ProfileUpdate {
    fn from(req: CompleteProfileRequest) -> Self {
        ProfileUpdate {
            age: req.age,
            gender: req.gender,
            preference: req.preference,
            city: req.city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            latitude: req.latitude,
            longitude: req.longitude,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportPartnerRequest {
    #[validate(length(min = 1, max = 255))]
    #[serde(default = "default_report_reason")]
    pub reason: String,
}

fn default_report_reason() -> String {
    "User reported".to_string()
}

/// Billing hook granting premium for a number of days
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GrantPremiumRequest {
    #[validate(length(min = 1, max = 100))]
    pub plan: String,
    #[validate(range(min = 1, max = 366))]
    #[serde(alias = "duration_days", rename = "durationDays")]
    pub duration_days: u32,
}
