pub mod canonical;
pub mod error;
pub mod event;
pub mod usage;

pub use canonical::{body_hash, canonicalize};
pub use error::DomainError;
pub use event::{BatchStats, BatchStatus, Event, StatusCounts, TaskStatus};
pub use usage::{TimeBucket, UsageStats, UsageSummary, cache_hit_rate, tokens_per_second};
