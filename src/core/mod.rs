// Core algorithm exports
pub mod committer;
pub mod compatibility;
pub mod distance;
pub mod eligibility;
pub mod lifecycle;
pub mod matcher;
pub mod quota;
pub mod scheduler;
pub mod window;

pub use committer::{CommitOutcome, MatchCommitter};
pub use compatibility::CompatibilityRule;
pub use distance::haversine_distance;
pub use eligibility::{EligibilityFilter, Ineligible, PremiumStatus};
pub use lifecycle::{LifecycleError, LifecycleService, TransitionOutcome, UserStatus};
pub use matcher::Matcher;
pub use quota::QuotaGate;
pub use scheduler::{Scheduler, SchedulerSettings, Strategy, TickError, TickOutcome, TickReport};
pub use window::{PriorityWindowEvaluator, Selection, Tier};
