// Port Layer - Interfaces for external dependencies

pub mod throttle;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use throttle::{ThrottleBackend, ThrottleError, ThrottlePort};
pub use time_provider::TimeProvider;
