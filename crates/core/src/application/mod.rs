// Application Layer - Admission queues, settings wiring, call-site helpers

pub mod admission;
pub mod registry;
pub mod ttl_cache;

// Re-exports
pub use admission::{AcquireBackoff, AdmissionQueue, QueueOptions, TaskHandle};
pub use registry::{GlobalLimits, QueueRegistry, SettingsCell};
pub use ttl_cache::TtlCache;
