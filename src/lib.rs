//! Mystery Match - matchmaking engine for anonymous one-on-one chats
//!
//! Sweeps the pool of searching users on a fixed cadence and pairs them
//! through a staged pipeline: eligibility, compatibility, then
//! time-gated locality windows, with a free-tier quota on every pairing.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{LifecycleService, MatchCommitter, Matcher, Scheduler, SchedulerSettings, TickReport};
pub use models::{Gender, Match, MatchPolicy, User, UserId, UserState};
pub use services::{InMemoryStore, NotificationDispatcher, PostgresStore, StateStore, StoreError};
