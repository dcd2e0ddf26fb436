// Domain Layer - Queue names, settings and observability snapshots

pub mod error;
pub mod queue;
pub mod settings;

// Re-exports
pub use error::DomainError;
pub use queue::{QueueKind, QueueName, QueueStats, ThrottleCounters};
pub use settings::{QueueSettings, QueueSettingsPatch};
