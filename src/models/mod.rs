// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    pair_key, BlockedPair, BoundingBox, Gender, GeoPoint, Match, MatchId, MatchNotification,
    MatchPolicy, NotificationKind, PairingCommit, ProfileUpdate, Report, User, UserId, UserState,
};
pub use requests::{CompleteProfileRequest, GrantPremiumRequest, RegisterUserRequest, ReportPartnerRequest};
pub use responses::{ErrorResponse, HealthResponse, TransitionResponse, UserResponse};
